use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::time::{Duration, Instant};

use domain::alert::error::DispatchError;

/// Retry policy for webhook delivery: bounded attempts, exponential
/// backoff with deterministic jitter, and a per-attempt timeout.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (never fewer than 1).
    pub max_attempts: usize,
    /// Backoff before the second attempt; doubles per retry.
    pub base_backoff: Duration,
    /// Upper bound on any single backoff delay, including server-supplied
    /// `Retry-After` hints.
    pub max_backoff: Duration,
    /// Deadline for one attempt (connect + response).
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (1-based), jittered into
    /// `[50%, 100%]` of the exponential value. The jitter is derived by
    /// hashing `(seed, retry)` so tests are reproducible without an RNG
    /// dependency.
    pub fn backoff_for(&self, retry: usize, seed: u64) -> Duration {
        let exp = self
            .base_backoff
            .saturating_mul(1u32 << retry.saturating_sub(1).min(16) as u32)
            .min(self.max_backoff);

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        seed.hash(&mut hasher);
        retry.hash(&mut hasher);
        // Scale into [0.5, 1.0).
        let frac = (hasher.finish() % 512) as f64 / 1024.0;
        exp.mul_f64(0.5 + frac)
    }

    /// Cap a server-supplied delay hint to `max_backoff`.
    pub fn clamp_hint(&self, hint: Duration) -> Duration {
        hint.min(self.max_backoff)
    }
}

/// Sleep abstraction so retry tests run without real delays.
pub trait Sleeper: Send + Sync {
    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Execute `attempt` up to `policy.max_attempts` times.
///
/// Each attempt runs under the per-attempt timeout; elapsing counts as a
/// retryable `DispatchError::Timeout`. A non-retryable error stops the
/// loop immediately. Between attempts the function sleeps for the
/// jittered backoff, or for the error's `Retry-After` hint when one is
/// present (429), clamped to `max_backoff`.
///
/// Returns the success value or final error, paired with the number of
/// attempts actually made.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    jitter_seed: u64,
    mut attempt: F,
) -> Result<(T, usize), (DispatchError, usize)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DispatchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = DispatchError::Timeout;

    for attempt_no in 1..=max_attempts {
        let attempt_started = Instant::now();
        let result = match tokio::time::timeout(policy.attempt_timeout, attempt()).await {
            Ok(inner) => inner,
            Err(_elapsed) => Err(DispatchError::Timeout),
        };

        match result {
            Ok(value) => return Ok((value, attempt_no)),
            Err(e) => {
                tracing::debug!(
                    attempt = attempt_no,
                    max_attempts,
                    elapsed_ms = attempt_started.elapsed().as_millis() as u64,
                    kind = e.kind_label(),
                    error = %e,
                    "delivery attempt failed"
                );
                if !e.is_retryable() {
                    return Err((e, attempt_no));
                }
                if attempt_no == max_attempts {
                    return Err((e, attempt_no));
                }
                let delay = match e.retry_after_hint() {
                    Some(hint) => policy.clamp_hint(hint),
                    None => policy.backoff_for(attempt_no, jitter_seed),
                };
                last_error = e;
                sleeper.sleep(delay).await;
            }
        }
    }

    Err((last_error, max_attempts))
}
