use std::time::{Duration, Instant};

/// Circuit breaker state for a webhook destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, all dispatches allowed.
    Closed = 0,
    /// One probe dispatch allowed after the open period elapsed.
    HalfOpen = 1,
    /// Dispatches blocked until the open period elapses.
    Open = 2,
}

impl CircuitState {
    /// Numeric value for the Prometheus gauge (0=closed, 1=half-open, 2=open).
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Per-destination breaker guarding the webhook sender against an
/// endpoint that fails every delivery.
///
/// Transitions: Closed to Open after `failure_threshold` consecutive
/// failed deliveries; Open to HalfOpen once `open_period` has elapsed;
/// HalfOpen to Closed on a delivered probe, back to Open on a failed one.
///
/// Time is passed in explicitly so tests never sleep.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: usize,
    failure_threshold: usize,
    open_period: Duration,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: usize, open_period: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            failure_threshold: failure_threshold.max(1),
            open_period,
            opened_at: None,
        }
    }

    /// Whether a dispatch may proceed at `now`. An open circuit whose
    /// open period has elapsed transitions to half-open and admits one
    /// probe.
    pub fn allow(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => match self.opened_at {
                Some(opened_at) if now.duration_since(opened_at) >= self.open_period => {
                    self.state = CircuitState::HalfOpen;
                    true
                }
                _ => false,
            },
        }
    }

    /// A delivery succeeded: close the circuit and reset the failure run.
    pub fn on_success(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    /// A delivery failed (after its own retries): extend the failure run
    /// and open the circuit once the threshold is reached.
    pub fn on_failure(&mut self, now: Instant) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.failure_threshold {
            self.state = CircuitState::Open;
            self.opened_at = Some(now);
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }
}
