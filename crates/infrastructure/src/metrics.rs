use ports::secondary::metrics_port::{AlertMetrics, ConfigMetrics};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets_range};
use prometheus_client::registry::Registry;

// ── Label types ─────────────────────────────────────────────────────

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HazardLabels {
    pub hazard: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct KindLabels {
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DestinationLabels {
    pub destination: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResultLabels {
    pub result: String,
}

// ── Monitor metrics registry ────────────────────────────────────────

/// Prometheus metrics registry for the monitor.
///
/// All metric families use interior mutability (atomics), so recording
/// metrics only requires `&self`. The registry itself is NOT Clone —
/// wrap in `Arc` for multi-task sharing.
pub struct MonitorMetrics {
    registry: Registry,
    pub records_evaluated_total: Family<HazardLabels, Counter>,
    pub records_matched_total: Family<HazardLabels, Counter>,
    pub alerts_deduplicated_total: Family<HazardLabels, Counter>,
    pub alerts_delivered_total: Family<HazardLabels, Counter>,
    pub dispatch_failures_total: Family<KindLabels, Counter>,
    pub dispatch_duration_seconds: Histogram,
    pub webhook_circuit_state: Family<DestinationLabels, Gauge>,
    pub rules_loaded: Gauge,
    pub rules_reloads_total: Family<ResultLabels, Counter>,
}

impl MonitorMetrics {
    /// Create a new metrics registry with all metrics registered under
    /// the `hazardwatch` prefix.
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("hazardwatch");

        let records_evaluated_total = Family::<HazardLabels, Counter>::default();
        registry.register(
            "records_evaluated",
            "Hazard records evaluated against alert rules",
            records_evaluated_total.clone(),
        );

        let records_matched_total = Family::<HazardLabels, Counter>::default();
        registry.register(
            "records_matched",
            "Hazard records that crossed their rule's thresholds",
            records_matched_total.clone(),
        );

        let alerts_deduplicated_total = Family::<HazardLabels, Counter>::default();
        registry.register(
            "alerts_deduplicated",
            "Matching records suppressed by the dedup ledger",
            alerts_deduplicated_total.clone(),
        );

        let alerts_delivered_total = Family::<HazardLabels, Counter>::default();
        registry.register(
            "alerts_delivered",
            "Webhook deliveries that succeeded",
            alerts_delivered_total.clone(),
        );

        let dispatch_failures_total = Family::<KindLabels, Counter>::default();
        registry.register(
            "dispatch_failures",
            "Webhook dispatches that failed, by error class",
            dispatch_failures_total.clone(),
        );

        // Exponential buckets from 10ms to 60s; a dispatch spans all
        // its retry attempts.
        let dispatch_duration_seconds = Histogram::new(exponential_buckets_range(0.01, 60.0, 12));
        registry.register(
            "dispatch_duration_seconds",
            "Full webhook dispatch latency in seconds, including retries",
            dispatch_duration_seconds.clone(),
        );

        let webhook_circuit_state = Family::<DestinationLabels, Gauge>::default();
        registry.register(
            "webhook_circuit_state",
            "Circuit breaker state per destination (0=closed, 1=half-open, 2=open)",
            webhook_circuit_state.clone(),
        );

        let rules_loaded = Gauge::default();
        registry.register(
            "rules_loaded",
            "Number of alert rules currently loaded",
            rules_loaded.clone(),
        );

        let rules_reloads_total = Family::<ResultLabels, Counter>::default();
        registry.register(
            "rules_reloads",
            "Rule set reloads by result",
            rules_reloads_total.clone(),
        );

        Self {
            registry,
            records_evaluated_total,
            records_matched_total,
            alerts_deduplicated_total,
            alerts_delivered_total,
            dispatch_failures_total,
            dispatch_duration_seconds,
            webhook_circuit_state,
            rules_loaded,
            rules_reloads_total,
        }
    }

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)
            .expect("encoding metrics to string should not fail");
        buffer
    }
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertMetrics for MonitorMetrics {
    fn record_evaluated(&self, hazard: &str) {
        self.records_evaluated_total
            .get_or_create(&HazardLabels {
                hazard: hazard.to_string(),
            })
            .inc();
    }

    fn record_matched(&self, hazard: &str) {
        self.records_matched_total
            .get_or_create(&HazardLabels {
                hazard: hazard.to_string(),
            })
            .inc();
    }

    fn record_deduplicated(&self, hazard: &str) {
        self.alerts_deduplicated_total
            .get_or_create(&HazardLabels {
                hazard: hazard.to_string(),
            })
            .inc();
    }

    fn record_delivered(&self, hazard: &str) {
        self.alerts_delivered_total
            .get_or_create(&HazardLabels {
                hazard: hazard.to_string(),
            })
            .inc();
    }

    fn record_dispatch_failed(&self, kind: &str) {
        self.dispatch_failures_total
            .get_or_create(&KindLabels {
                kind: kind.to_string(),
            })
            .inc();
    }

    fn observe_dispatch_duration(&self, seconds: f64) {
        self.dispatch_duration_seconds.observe(seconds);
    }

    fn record_circuit_state(&self, destination: &str, state: u8) {
        self.webhook_circuit_state
            .get_or_create(&DestinationLabels {
                destination: destination.to_string(),
            })
            .set(i64::from(state));
    }
}

impl ConfigMetrics for MonitorMetrics {
    fn record_rules_reload(&self, result: &str) {
        self.rules_reloads_total
            .get_or_create(&ResultLabels {
                result: result.to_string(),
            })
            .inc();
    }

    fn set_rules_loaded(&self, count: u64) {
        self.rules_loaded.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}
