use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use domain::alert::entity::{AlertPayload, AlertRule, DispatchOutcome, RuleSet};
use domain::alert::evaluator::evaluate;
use domain::alert::ledger::DedupLedger;
use domain::hazard::entity::{HazardRecord, HazardType};
use ports::secondary::metrics_port::MetricsPort;
use ports::secondary::webhook_port::WebhookPort;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const DEFAULT_CYCLE_DEADLINE: Duration = Duration::from_secs(60);

/// Per-cycle outcome counts, returned to the caller and logged for
/// health-check consumption. Failures never escalate past this summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub evaluated: usize,
    pub matched: usize,
    pub deduplicated: usize,
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Dispatches still in flight when the cycle deadline expired; their
    /// eventual outcomes were discarded.
    pub abandoned: usize,
    pub failures: Vec<String>,
}

enum RecordOutcome {
    NotMonitored,
    NoMatch,
    Deduplicated,
    Delivered,
    Skipped,
    Failed(String),
}

/// Composes evaluator, dedup ledger, and webhook dispatch into one
/// per-poll-cycle operation: evaluate, dedup-check, dispatch, record.
///
/// Rules are swapped wholesale between cycles (`reload_rules`); in-flight
/// cycles keep the `Arc` they started with, so a rule is never mutated
/// mid-evaluation.
pub struct AlertOrchestrator {
    rules: Arc<RuleSet>,
    ledger: Arc<DedupLedger>,
    webhook: Arc<dyn WebhookPort>,
    metrics: Arc<dyn MetricsPort>,
    cycle_deadline: Duration,
}

impl AlertOrchestrator {
    pub fn new(
        rules: RuleSet,
        ledger: Arc<DedupLedger>,
        webhook: Arc<dyn WebhookPort>,
        metrics: Arc<dyn MetricsPort>,
    ) -> Self {
        metrics.set_rules_loaded(rules.len() as u64);
        Self {
            rules: Arc::new(rules),
            ledger,
            webhook,
            metrics,
            cycle_deadline: DEFAULT_CYCLE_DEADLINE,
        }
    }

    #[must_use]
    pub fn with_cycle_deadline(mut self, deadline: Duration) -> Self {
        self.cycle_deadline = deadline;
        self
    }

    /// Hot-swap the rule set between cycles. Ledger state is preserved,
    /// so already-notified events stay suppressed across reloads.
    pub fn reload_rules(&mut self, rules: RuleSet) {
        self.metrics.set_rules_loaded(rules.len() as u64);
        self.metrics.record_rules_reload("success");
        self.rules = Arc::new(rules);
    }

    /// Process one batch of freshly fetched records against the current
    /// rules. Records are handled concurrently; the ledger serializes
    /// only same-key accesses. The cycle runs under an overall deadline;
    /// work still pending when it expires is aborted and reported as
    /// `abandoned`.
    pub async fn run_cycle(&self, records: Vec<HazardRecord>) -> CycleSummary {
        let mut summary = CycleSummary::default();
        let mut tasks: JoinSet<RecordOutcome> = JoinSet::new();

        // Collapse duplicate keys within the batch so one cycle cannot
        // race itself on a key between dedup check and record-write.
        let mut seen: HashSet<(HazardType, String)> = HashSet::new();

        for record in records {
            let key = (record.hazard_type, record.identifier.clone());
            if !seen.insert(key) {
                self.metrics.record_deduplicated(record.hazard_type.as_str());
                summary.deduplicated += 1;
                continue;
            }

            let rule = self.rules.rule_for(record.hazard_type).cloned();
            tasks.spawn(process_record(
                record,
                rule,
                Arc::clone(&self.ledger),
                Arc::clone(&self.webhook),
                Arc::clone(&self.metrics),
            ));
        }

        let deadline = tokio::time::Instant::now() + self.cycle_deadline;
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok(outcome)) => summary.apply(outcome),
                    Some(Err(_aborted)) => summary.abandoned += 1,
                    None => break,
                },
                () = tokio::time::sleep_until(deadline) => {
                    summary.abandoned += tasks.len();
                    tasks.abort_all();
                    break;
                }
            }
        }

        // Amortized cleanup, once per cycle.
        self.ledger.evict_expired(Instant::now());

        tracing::info!(
            evaluated = summary.evaluated,
            matched = summary.matched,
            deduplicated = summary.deduplicated,
            delivered = summary.delivered,
            skipped = summary.skipped,
            failed = summary.failed,
            abandoned = summary.abandoned,
            "poll cycle complete"
        );
        summary
    }

    /// Consume batches from the channel until it closes or the token
    /// fires; pending batches are drained on cancellation.
    pub async fn run(self, mut rx: mpsc::Receiver<Vec<HazardRecord>>, cancel: CancellationToken) {
        let mut cycles: u64 = 0;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    while let Ok(batch) = rx.try_recv() {
                        cycles += 1;
                        self.run_cycle(batch).await;
                    }
                    break;
                }
                msg = rx.recv() => match msg {
                    Some(batch) => {
                        cycles += 1;
                        self.run_cycle(batch).await;
                    }
                    None => break,
                }
            }
        }

        tracing::info!(total_cycles = cycles, "alert orchestrator stopped");
    }
}

impl CycleSummary {
    fn apply(&mut self, outcome: RecordOutcome) {
        self.evaluated += 1;
        match outcome {
            RecordOutcome::NotMonitored | RecordOutcome::NoMatch => {}
            RecordOutcome::Deduplicated => {
                self.matched += 1;
                self.deduplicated += 1;
            }
            RecordOutcome::Delivered => {
                self.matched += 1;
                self.delivered += 1;
            }
            RecordOutcome::Skipped => {
                self.matched += 1;
                self.skipped += 1;
            }
            RecordOutcome::Failed(reason) => {
                self.matched += 1;
                self.failed += 1;
                self.failures.push(reason);
            }
        }
    }
}

async fn process_record(
    record: HazardRecord,
    rule: Option<AlertRule>,
    ledger: Arc<DedupLedger>,
    webhook: Arc<dyn WebhookPort>,
    metrics: Arc<dyn MetricsPort>,
) -> RecordOutcome {
    let hazard = record.hazard_type;
    metrics.record_evaluated(hazard.as_str());

    let Some(rule) = rule else {
        tracing::debug!(
            hazard = %hazard,
            identifier = %record.identifier,
            "hazard type not monitored"
        );
        return RecordOutcome::NotMonitored;
    };

    if !evaluate(&record, &rule) {
        tracing::debug!(
            hazard = %hazard,
            identifier = %record.identifier,
            severity = %record.severity,
            "record below alert thresholds"
        );
        return RecordOutcome::NoMatch;
    }
    metrics.record_matched(hazard.as_str());

    // Lock scope is inside the ledger; nothing is held across the
    // dispatch await below.
    if !ledger.should_notify(hazard, &record.identifier, Instant::now()) {
        metrics.record_deduplicated(hazard.as_str());
        tracing::debug!(
            hazard = %hazard,
            identifier = %record.identifier,
            "already notified within retention window"
        );
        return RecordOutcome::Deduplicated;
    }

    let payload = AlertPayload::from_record(&record);
    match webhook.dispatch(rule.webhook_url.as_deref(), &payload).await {
        DispatchOutcome::Delivered { attempts } => {
            ledger.record_notified(hazard, &record.identifier, Instant::now());
            metrics.record_delivered(hazard.as_str());
            tracing::info!(
                hazard = %hazard,
                identifier = %record.identifier,
                attempts,
                summary = %payload.summary,
                "webhook delivered"
            );
            RecordOutcome::Delivered
        }
        // No dedup entry on Skipped: if a webhook URL is added later,
        // a still-fresh event can still notify.
        DispatchOutcome::Skipped => {
            tracing::debug!(
                hazard = %hazard,
                identifier = %record.identifier,
                "matched but no webhook configured (dry run)"
            );
            RecordOutcome::Skipped
        }
        DispatchOutcome::Failed { reason, attempts } => {
            tracing::warn!(
                hazard = %hazard,
                identifier = %record.identifier,
                attempts,
                reason = %reason,
                "webhook delivery failed"
            );
            RecordOutcome::Failed(format!("{hazard}/{}: {reason}", record.identifier))
        }
    }
}
