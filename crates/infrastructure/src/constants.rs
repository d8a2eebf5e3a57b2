use std::time::Duration;

// ── Paths ──────────────────────────────────────────────────────────

pub const DEFAULT_CONFIG_PATH: &str = "/etc/hazardwatch/config.yaml";

// ── Alerting defaults ──────────────────────────────────────────────

/// How long a (hazard type, identifier) pair stays suppressed after a
/// successful notification.
pub const DEFAULT_DEDUP_RETENTION_HOURS: u64 = 24;

/// Wall-clock budget for one poll cycle; work past it is abandoned.
pub const DEFAULT_CYCLE_DEADLINE_SECS: u64 = 60;

// ── Webhook delivery defaults ──────────────────────────────────────

pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_WEBHOOK_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_WEBHOOK_BASE_BACKOFF_MS: u64 = 500;
pub const DEFAULT_WEBHOOK_MAX_BACKOFF_SECS: u64 = 30;
pub const DEFAULT_BREAKER_THRESHOLD: usize = 5;
pub const DEFAULT_BREAKER_OPEN_SECS: u64 = 60;

// ── Channel capacities ─────────────────────────────────────────────

pub const RECORD_BATCH_CHANNEL_CAPACITY: usize = 1_000;

// ── Timeouts ───────────────────────────────────────────────────────

pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
