//! C7 — the retry/deferral manager.
//!
//! A process-wide queue of plans that failed to apply for a transient
//! reason. The manager itself is a pure scheduler: it decides which
//! entries are due, expired, or abandoned, but never calls the executor
//! directly (see the design note on avoiding global singletons — the
//! orchestration loop wires this queue to [`crate::executor`] via a plain
//! function handler).

use crate::executor::DeferCause;
use parking_lot::Mutex;
use right_sizer_core::ResizePlan;
use std::collections::HashMap;
use std::time::{Duration, Instant};

impl DeferCause {
    pub fn as_str(self) -> &'static str {
        match self {
            DeferCause::NodeResourceConstraint => "NodeResourceConstraint",
            DeferCause::ResourceQuotaConstraint => "ResourceQuotaConstraint",
            DeferCause::Transport => "Transport",
        }
    }
}

/// The default exponential-backoff growth factor applied per attempt.
const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// The hard ceiling on the computed backoff delay, regardless of attempt
/// count (§4.7).
const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct DeferredEntry {
    pub plan: ResizePlan,
    pub reason: DeferCause,
    pub original_error: String,
    pub first_attempt: Instant,
    pub last_attempt: Instant,
    pub attempts: u32,
    pub priority: i32,
    pub backoff_factor: f64,
}

impl DeferredEntry {
    /// The instant at which this entry becomes eligible for another
    /// attempt, per the backoff gate formula in §4.7.
    fn due_at(&self, retry_interval: Duration) -> Instant {
        let base_delay = retry_interval / 2;
        let scaled = base_delay.mul_f64(self.attempts as f64 * self.backoff_factor);
        let delay = scaled.min(MAX_BACKOFF_DELAY);
        self.last_attempt + delay
    }
}

/// The result of classifying every entry in the queue at a point in time:
/// what has expired, what has been abandoned, and what is due for another
/// attempt (already sorted by `priority desc, firstAttempt asc`).
#[derive(Debug, Default)]
pub struct DueBatch {
    pub expired: Vec<(String, DeferredEntry)>,
    pub abandoned: Vec<(String, DeferredEntry)>,
    pub ready: Vec<(String, DeferredEntry)>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryStats {
    pub queued: usize,
}

pub struct RetryManager {
    max_retries: u32,
    max_deferral_time: Duration,
    retry_interval: Duration,
    entries: Mutex<HashMap<String, DeferredEntry>>,
}

impl RetryManager {
    pub fn new(max_retries: u32, max_deferral_time: Duration, retry_interval: Duration) -> Self {
        RetryManager {
            max_retries,
            max_deferral_time,
            retry_interval,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Create a new deferred entry, or update an existing one for the same
    /// pod key — incrementing `attempts` either way. Used both when a plan
    /// is first deferred and when a retried plan fails again (§4.7
    /// `enqueue`).
    pub fn enqueue(&self, pod_key: String, plan: ResizePlan, reason: DeferCause, error: String, priority: i32, now: Instant) -> u32 {
        let mut entries = self.entries.lock();
        let entry = entries.entry(pod_key).or_insert_with(|| DeferredEntry {
            plan: plan.clone(),
            reason,
            original_error: error.clone(),
            first_attempt: now,
            last_attempt: now,
            attempts: 0,
            priority,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        });
        entry.plan = plan;
        entry.reason = reason;
        entry.original_error = error;
        entry.last_attempt = now;
        entry.attempts += 1;
        entry.attempts
    }

    pub fn remove(&self, pod_key: &str) -> Option<DeferredEntry> {
        self.entries.lock().remove(pod_key)
    }

    pub fn is_deferred(&self, pod_key: &str) -> bool {
        self.entries.lock().contains_key(pod_key)
    }

    pub fn stats(&self) -> RetryStats {
        RetryStats { queued: self.entries.lock().len() }
    }

    /// Classify every entry at `now` into expired / abandoned / ready,
    /// removing the expired and abandoned entries from the queue as a side
    /// effect (§4.7 `processTick`). `ready` is sorted by `priority desc`
    /// then `firstAttempt asc`, and already filtered down to entries whose
    /// backoff delay has elapsed.
    pub fn snapshot_due(&self, now: Instant) -> DueBatch {
        let mut entries = self.entries.lock();
        let mut batch = DueBatch::default();
        let keys: Vec<String> = entries.keys().cloned().collect();

        for key in keys {
            let expired = {
                let entry = entries.get(&key).unwrap();
                now.saturating_duration_since(entry.first_attempt) > self.max_deferral_time
            };
            if expired {
                let entry = entries.remove(&key).unwrap();
                batch.expired.push((key, entry));
                continue;
            }

            let abandoned = entries.get(&key).unwrap().attempts > self.max_retries;
            if abandoned {
                let entry = entries.remove(&key).unwrap();
                batch.abandoned.push((key, entry));
                continue;
            }

            let due = entries.get(&key).unwrap().due_at(self.retry_interval) <= now;
            if due {
                batch.ready.push((key.clone(), entries.get(&key).unwrap().clone()));
            }
        }

        batch.ready.sort_by(|(_, a), (_, b)| b.priority.cmp(&a.priority).then(a.first_attempt.cmp(&b.first_attempt)));
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use right_sizer_core::types::{ContainerRef, ResourceRequirements};

    fn plan(name: &str) -> ResizePlan {
        ResizePlan {
            container: ContainerRef { namespace: "ns".into(), pod_name: name.into(), container_name: "c".into(), container_index: 0 },
            old_resources: ResourceRequirements::default(),
            new_resources: ResourceRequirements::default(),
            reason: "test".into(),
        }
    }

    #[test]
    fn l7_enqueue_is_idempotent_per_pod_key() {
        let mgr = RetryManager::new(5, Duration::from_secs(600), Duration::from_secs(30));
        let now = Instant::now();
        mgr.enqueue("ns/a".into(), plan("a"), DeferCause::Transport, "boom".into(), 0, now);
        mgr.enqueue("ns/a".into(), plan("a"), DeferCause::Transport, "boom again".into(), 0, now);
        assert_eq!(mgr.stats().queued, 1);
        assert_eq!(mgr.entries.lock().get("ns/a").unwrap().attempts, 2);
    }

    #[test]
    fn scenario_4_defer_then_backoff_then_due() {
        let mgr = RetryManager::new(5, Duration::from_secs(600), Duration::from_secs(30));
        let t0 = Instant::now();
        mgr.enqueue("ns/a".into(), plan("a"), DeferCause::NodeResourceConstraint, "exceeds node capacity".into(), 0, t0);

        // base_delay = 15s, attempts=1, factor=2.0 -> 30s
        let batch = mgr.snapshot_due(t0 + Duration::from_secs(10));
        assert!(batch.ready.is_empty(), "should not be due yet");

        let batch = mgr.snapshot_due(t0 + Duration::from_secs(31));
        assert_eq!(batch.ready.len(), 1);
    }

    #[test]
    fn expires_past_max_deferral_time() {
        let mgr = RetryManager::new(5, Duration::from_secs(60), Duration::from_secs(30));
        let t0 = Instant::now();
        mgr.enqueue("ns/a".into(), plan("a"), DeferCause::Transport, "boom".into(), 0, t0);
        let batch = mgr.snapshot_due(t0 + Duration::from_secs(61));
        assert_eq!(batch.expired.len(), 1);
        assert!(!mgr.is_deferred("ns/a"));
    }

    #[test]
    fn abandons_past_max_retries() {
        let mgr = RetryManager::new(2, Duration::from_secs(600), Duration::from_secs(30));
        let t0 = Instant::now();
        for i in 0..3 {
            mgr.enqueue("ns/a".into(), plan("a"), DeferCause::Transport, "boom".into(), 0, t0 + Duration::from_secs(i * 200));
        }
        let batch = mgr.snapshot_due(t0 + Duration::from_secs(1000));
        assert_eq!(batch.abandoned.len(), 1);
    }

    #[test]
    fn ready_entries_sorted_by_priority_then_age() {
        let mgr = RetryManager::new(5, Duration::from_secs(600), Duration::from_secs(30));
        let t0 = Instant::now();
        mgr.enqueue("ns/low".into(), plan("low"), DeferCause::Transport, "x".into(), 0, t0);
        mgr.enqueue("ns/high".into(), plan("high"), DeferCause::Transport, "x".into(), 10, t0 + Duration::from_secs(1));
        let batch = mgr.snapshot_due(t0 + Duration::from_secs(100));
        assert_eq!(batch.ready[0].0, "ns/high");
    }
}
