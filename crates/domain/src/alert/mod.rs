pub mod circuit_breaker;
pub mod entity;
pub mod error;
pub mod evaluator;
pub mod ledger;
