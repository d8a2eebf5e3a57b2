// Focused sub-traits for recording Prometheus metrics.
//
// All methods take `&self`; the production implementation uses atomic
// operations (interior mutability via `prometheus-client`). Default
// implementations are no-ops so test mocks implement only the methods
// they assert on.

/// Alert pipeline metrics.
pub trait AlertMetrics: Send + Sync {
    /// A record was evaluated against its rule.
    fn record_evaluated(&self, _hazard: &str) {}

    /// A record crossed its rule's thresholds.
    fn record_matched(&self, _hazard: &str) {}

    /// A matching record was suppressed by the dedup ledger.
    fn record_deduplicated(&self, _hazard: &str) {}

    /// A webhook delivery succeeded.
    fn record_delivered(&self, _hazard: &str) {}

    /// A webhook delivery failed; `kind` is a stable error-class label
    /// (`DispatchError::kind_label`).
    fn record_dispatch_failed(&self, _kind: &str) {}

    /// Observe a full dispatch duration (all attempts) in seconds.
    fn observe_dispatch_duration(&self, _seconds: f64) {}

    /// Circuit breaker state for a webhook destination.
    /// State values: 0=closed, 1=half-open, 2=open.
    fn record_circuit_state(&self, _destination: &str, _state: u8) {}
}

/// Configuration lifecycle metrics.
pub trait ConfigMetrics: Send + Sync {
    /// A rules reload completed with the given result ("success"/"failure").
    fn record_rules_reload(&self, _result: &str) {}

    /// Number of alert rules currently loaded.
    fn set_rules_loaded(&self, _count: u64) {}
}

/// Umbrella port for components that record across metric groups.
pub trait MetricsPort: AlertMetrics + ConfigMetrics {}

impl<T: AlertMetrics + ConfigMetrics> MetricsPort for T {}

/// No-op implementation for tests and dispatch paths that do not
/// report metrics.
#[derive(Debug, Default)]
pub struct NoopMetrics;

impl AlertMetrics for NoopMetrics {}
impl ConfigMetrics for NoopMetrics {}
