use std::time::Duration;

use thiserror::Error;

/// Failure of a single webhook delivery attempt.
///
/// The taxonomy drives the retry policy: timeouts, connection errors,
/// 5xx, and 429 are retryable; any other 4xx is fatal.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("attempt timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("webhook returned HTTP {code}")]
    Status { code: u16 },

    #[error("webhook rate limited (HTTP 429)")]
    RateLimited { retry_after: Option<Duration> },

    #[error("failed to serialize payload: {0}")]
    Serialize(String),

    #[error("circuit breaker open for '{destination}'")]
    CircuitOpen { destination: String },
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) | Self::RateLimited { .. } => true,
            Self::Status { code } => (500..600).contains(code),
            Self::Serialize(_) | Self::CircuitOpen { .. } => false,
        }
    }

    /// Stable low-cardinality name for metrics labels.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect(_) => "connect",
            Self::Status { .. } => "http_status",
            Self::RateLimited { .. } => "rate_limited",
            Self::Serialize(_) => "serialize",
            Self::CircuitOpen { .. } => "circuit_open",
        }
    }

    /// Server-supplied delay before the next attempt, if any (429 with a
    /// `Retry-After` header).
    pub fn retry_after_hint(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}
