pub mod metrics_port;
pub mod webhook_port;
