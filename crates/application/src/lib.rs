#![forbid(unsafe_code)]

pub mod alert_cycle;
pub mod retry;
