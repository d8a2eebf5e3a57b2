use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::hazard::entity::HazardType;

const DEFAULT_SHARDS: usize = 16;

/// In-memory record of which (hazard type, event identifier) pairs have
/// already triggered a webhook, bounded by a retention window.
///
/// Locking is key-sharded so unrelated keys never serialize against
/// each other. All methods are synchronous; callers must not hold any
/// ledger access across an await point (there is nothing to hold — no
/// guard escapes this module).
///
/// Process-lifetime only; nothing is persisted.
#[derive(Debug)]
pub struct DedupLedger {
    shards: Vec<Mutex<HashMap<(HazardType, String), Instant>>>,
    retention: Duration,
}

impl DedupLedger {
    pub fn new(retention: Duration) -> Self {
        Self::with_shards(retention, DEFAULT_SHARDS)
    }

    pub fn with_shards(retention: Duration, shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| Mutex::new(HashMap::new())).collect(),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// True if the key has never notified, or its last notification is
    /// older than the retention window.
    pub fn should_notify(&self, hazard: HazardType, identifier: &str, now: Instant) -> bool {
        let shard = self.shard_for(hazard, identifier);
        let guard = shard.lock().expect("ledger shard poisoned");
        match guard.get(&(hazard, identifier.to_string())) {
            Some(&notified_at) => now.duration_since(notified_at) > self.retention,
            None => true,
        }
    }

    /// Record a successful notification. Called only after a dispatch
    /// was judged delivered; skipped and failed dispatches leave no
    /// entry, so a later cycle can still notify.
    pub fn record_notified(&self, hazard: HazardType, identifier: &str, now: Instant) {
        let shard = self.shard_for(hazard, identifier);
        let mut guard = shard.lock().expect("ledger shard poisoned");
        guard.insert((hazard, identifier.to_string()), now);
    }

    /// Drop entries older than the retention window. Invoked once per
    /// poll cycle; amortized cleanup bounds memory without a background
    /// timer.
    pub fn evict_expired(&self, now: Instant) {
        for shard in &self.shards {
            let mut guard = shard.lock().expect("ledger shard poisoned");
            guard.retain(|_, &mut notified_at| now.duration_since(notified_at) <= self.retention);
        }
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().expect("ledger shard poisoned").len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard_for(&self, hazard: HazardType, identifier: &str) -> &Mutex<HashMap<(HazardType, String), Instant>> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        hazard.hash(&mut hasher);
        identifier.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }
}
