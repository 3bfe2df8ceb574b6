//! C8 — the log-suppression cache.
//!
//! Collapses repeated, identical decisions for the same container into a
//! single diagnostic log line within a TTL window (L8). Readers vastly
//! outnumber writers in steady state (every tick re-checks every plan, but
//! only a changed plan writes), so a reader/writer lock is used rather
//! than a single mutex.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheEntry {
    old_cpu: String,
    new_cpu: String,
    old_mem: String,
    new_mem: String,
    last_seen: Instant,
}

/// Keyed by the container's `"<ns>/<pod>/<container>"` cache key (see
/// [`right_sizer_core::ContainerRef::cache_key`]).
pub struct LogSuppressionCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl LogSuppressionCache {
    pub fn new(ttl: Duration) -> Self {
        LogSuppressionCache { ttl, entries: RwLock::new(HashMap::new()) }
    }

    /// Decide whether this decision is loggable, and if so, record it so
    /// subsequent identical decisions are suppressed until the TTL lapses
    /// or the decision changes.
    pub fn observe(&self, key: &str, old_cpu: &str, new_cpu: &str, old_mem: &str, new_mem: &str) -> bool {
        self.observe_at(key, old_cpu, new_cpu, old_mem, new_mem, Instant::now())
    }

    /// Same as [`Self::observe`] but with an explicit clock, for
    /// deterministic testing.
    pub fn observe_at(&self, key: &str, old_cpu: &str, new_cpu: &str, old_mem: &str, new_mem: &str, now: Instant) -> bool {
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(key) {
                let stale = now.saturating_duration_since(entry.last_seen) >= self.ttl;
                let changed =
                    entry.old_cpu != old_cpu || entry.new_cpu != new_cpu || entry.old_mem != old_mem || entry.new_mem != new_mem;
                if !stale && !changed {
                    return false;
                }
            }
        }

        let mut entries = self.entries.write();
        entries.insert(
            key.to_string(),
            CacheEntry {
                old_cpu: old_cpu.to_string(),
                new_cpu: new_cpu.to_string(),
                old_mem: old_mem.to_string(),
                new_mem: new_mem.to_string(),
                last_seen: now,
            },
        );
        true
    }

    /// Drop entries that have not been observed within the TTL, run once
    /// per tick (§4.6 step 9).
    pub fn prune(&self) {
        self.prune_at(Instant::now());
    }

    pub fn prune_at(&self, now: Instant) {
        let mut entries = self.entries.write();
        entries.retain(|_, entry| now.saturating_duration_since(entry.last_seen) < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
