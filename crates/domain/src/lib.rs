#![forbid(unsafe_code)]

pub mod alert;
pub mod hazard;
