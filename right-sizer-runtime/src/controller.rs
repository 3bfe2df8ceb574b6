//! C6 — the orchestration loop.
//!
//! Runs the right-sizing tick on a fixed cadence, single-flight per process
//! (I7), and drives a companion loop draining the retry/deferral queue (C7)
//! on its own cadence. Mirrors the list -> filter -> reconcile shape of
//! `kube_runtime::Controller`'s applier loop, except pods are paced
//! sequentially within a batch rather than scheduled onto a work queue,
//! per §5's rate-limiting requirement.

use crate::cache::LogSuppressionCache;
use crate::client::{ClusterClient, EventSink, EventType, MetricsProvider, PodId, PodSnapshot};
use crate::conditions::{self, PodCondition};
use crate::eligibility;
use crate::error::ClientError;
use crate::executor::{self, ApplyGuard, ApplyOutcome};
use crate::parent;
use crate::retry::{DeferredEntry, RetryManager};
use chrono::Utc;
use json_patch::Patch;
use right_sizer_core::types::ResourceRequirements;
use right_sizer_core::{calculator, decision, Config, ResizePlan};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Relative change in a resource's request that counts as worth applying
/// (§4.6 `needsAdjustment`).
const ADJUSTMENT_THRESHOLD: f64 = 0.10;

/// Per-tick accounting, returned from [`Controller::tick`] mainly so tests
/// can assert on it without scraping logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickSummary {
    pub listed: usize,
    pub eligible: usize,
    pub plans: usize,
    pub applied: usize,
    pub deferred: usize,
    pub failed: usize,
    pub skipped_running: bool,
}

/// Owns every piece of mutable, cross-tick state (C6's single-flight flag,
/// C7's queue, C8's cache, C4's apply mutex) and the collaborator handles
/// (§6). One instance lives for the lifetime of the operator process.
pub struct Controller {
    client: Arc<dyn ClusterClient>,
    metrics: Arc<dyn MetricsProvider>,
    events: Arc<dyn EventSink>,
    config: Config,
    operator_namespace: String,
    apply_guard: ApplyGuard,
    retry: RetryManager,
    cache: LogSuppressionCache,
    running: AtomicBool,
}

impl Controller {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        metrics: Arc<dyn MetricsProvider>,
        events: Arc<dyn EventSink>,
        config: Config,
        operator_namespace: impl Into<String>,
    ) -> Self {
        let retry = RetryManager::new(config.max_retries, config.max_deferral_time, config.retry_interval);
        let cache = LogSuppressionCache::new(config.decision_log_ttl);
        Controller {
            client,
            metrics,
            events,
            config,
            operator_namespace: operator_namespace.into(),
            apply_guard: ApplyGuard::default(),
            retry,
            cache,
            running: AtomicBool::new(false),
        }
    }

    /// Run the orchestration loop forever at `resizeInterval` cadence, plus
    /// an immediate first tick, until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        self.tick(&cancel).await;
        let mut interval = tokio::time::interval(self.config.resize_interval);
        interval.tick().await; // first tick already consumed above
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("orchestration loop cancelled");
                    return;
                }
                _ = interval.tick() => {
                    self.tick(&cancel).await;
                }
            }
        }
    }

    /// Run the retry/deferral drain loop forever at `retryInterval` cadence
    /// until `cancel` fires (§4.7).
    pub async fn run_retry_loop(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.retry_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    self.process_retry_tick().await;
                }
            }
        }
    }

    /// Run a single tick to completion, honoring the single-flight guard
    /// (I7) and cancellation at batch/pod boundaries (§5).
    pub async fn tick(&self, cancel: &CancellationToken) -> TickSummary {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("previous tick still running, skipping this one (I7)");
            return TickSummary { skipped_running: true, ..TickSummary::default() };
        }

        let mut summary = TickSummary::default();
        if let Err(err) = self.run_tick(cancel, &mut summary).await {
            tracing::warn!(error = %err, "tick aborted while listing pods");
        }
        self.running.store(false, Ordering::SeqCst);
        self.cache.prune();
        summary
    }

    async fn run_tick(&self, cancel: &CancellationToken, summary: &mut TickSummary) -> Result<(), ClientError> {
        let pods = self.client.list_pods().await?;
        summary.listed = pods.len();

        let mut candidates: Vec<PodSnapshot> =
            pods.into_iter().filter(|pod| eligibility::is_eligible(pod, &self.config, &self.operator_namespace)).collect();
        candidates.truncate(self.config.max_pods_per_run);
        summary.eligible = candidates.len();

        let mut work: Vec<(PodSnapshot, Vec<ResizePlan>)> = Vec::new();
        for pod in candidates {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let usage = match self.metrics.fetch_pod_metrics(&pod.id).await {
                Ok(usage) => usage,
                Err(err) => {
                    tracing::debug!(pod = %pod.id, error = %err, "metrics unavailable, skipping pod this tick");
                    continue;
                }
            };
            let plans = self.plan_pod(&pod, usage);
            if !plans.is_empty() {
                work.push((pod, plans));
            }
        }
        summary.plans = work.iter().map(|(_, plans)| plans.len()).sum();

        if self.config.dry_run {
            for (pod, plans) in &work {
                for plan in plans {
                    tracing::info!(pod = %pod.id, container = %plan.container.container_name, reason = %plan.reason, "dry-run: would apply resize");
                }
            }
            return Ok(());
        }

        let batch_size = self.config.batch_size.max(1);
        for batch in work.chunks(batch_size) {
            if cancel.is_cancelled() {
                return Ok(());
            }
            for (pod, plans) in batch {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                self.apply_pod(pod, plans, summary).await;
                tokio::time::sleep(self.config.delay_between_pods).await;
            }
            tokio::time::sleep(self.config.delay_between_batches).await;
        }

        Ok(())
    }

    /// Compute the resize plans for every container in `pod` whose decision
    /// warrants an adjustment (§4.1, §4.2, §4.6 `needsAdjustment`).
    fn plan_pod(&self, pod: &PodSnapshot, usage: right_sizer_core::UsageSample) -> Vec<ResizePlan> {
        let container_resources = pod.container_resources();
        let pod_decision = decision::decide(usage, &container_resources, &self.config.thresholds);
        if pod_decision.is_none() || pod_decision.is_suppressed() {
            return Vec::new();
        }

        let per_container_usage = usage.per_container(pod.containers.len());
        let mut plans = Vec::new();
        for (index, container) in pod.containers.iter().enumerate() {
            let current = container.resources.cpu_requirements();
            let target = calculator::calculate(per_container_usage, pod_decision, &self.config, false);
            if !needs_adjustment(&current, &target) {
                continue;
            }

            let sanitized = right_sizer_core::patch::sanitize(&container.resources, &target);
            let new_resources = sanitized.cpu_requirements();
            if new_resources == current {
                continue;
            }

            let container_ref = right_sizer_core::ContainerRef {
                namespace: pod.id.namespace.clone(),
                pod_name: pod.id.name.clone(),
                container_name: container.name.clone(),
                container_index: index,
            };
            plans.push(ResizePlan {
                container: container_ref,
                old_resources: current,
                new_resources,
                reason: format!("cpu={}, memory={}", pod_decision.cpu, pod_decision.memory),
            });
        }
        plans
    }

    async fn apply_pod(&self, pod: &PodSnapshot, plans: &[ResizePlan], summary: &mut TickSummary) {
        if self.config.update_resize_policy {
            if let Some(owner) = &pod.owner {
                if let Err(err) = parent::update_chain(self.client.as_ref(), owner, Utc::now()).await {
                    tracing::debug!(pod = %pod.id, error = %err, "parent-template resize-policy update failed, continuing anyway");
                }
            }
        }

        for plan in plans {
            self.apply_plan(pod, plan, summary).await;
        }
    }

    async fn apply_plan(&self, pod: &PodSnapshot, plan: &ResizePlan, summary: &mut TickSummary) {
        let Some(container_index) = pod.container_index(&plan.container.container_name) else {
            tracing::warn!(pod = %pod.id, container = %plan.container.container_name, "container vanished before apply");
            return;
        };

        self.log_decision(pod, plan);

        let now = Utc::now();
        let mut conditions = Vec::new();
        conditions::set_pending(&mut conditions, "ResizeQueued", &plan.reason, now);
        self.push_conditions(&pod.id, &conditions).await;

        let container = &pod.containers[container_index];
        let outcome = executor::apply(
            self.client.as_ref(),
            &self.apply_guard,
            &pod.id,
            container_index,
            &container.resources,
            container.resize_policy,
            plan,
            &self.config,
        )
        .await;

        self.handle_outcome(&pod.id, plan, outcome, summary).await;
    }

    fn log_decision(&self, pod: &PodSnapshot, plan: &ResizePlan) {
        let old_cpu = plan.old_resources.cpu.request.map(|m| m.to_string()).unwrap_or_default();
        let new_cpu = plan.new_resources.cpu.request.map(|m| m.to_string()).unwrap_or_default();
        let old_mem = plan.old_resources.memory.request.map(|b| b.to_string()).unwrap_or_default();
        let new_mem = plan.new_resources.memory.request.map(|b| b.to_string()).unwrap_or_default();
        if self.cache.observe(&plan.container.cache_key(), &old_cpu, &new_cpu, &old_mem, &new_mem) {
            tracing::info!(
                pod = %pod.id,
                container = %plan.container.container_name,
                old_cpu, new_cpu, old_mem, new_mem,
                reason = %plan.reason,
                "resize plan computed"
            );
        }
    }

    async fn handle_outcome(&self, pod_id: &PodId, plan: &ResizePlan, outcome: ApplyOutcome, summary: &mut TickSummary) {
        let pod_key = plan.container.pod_key();
        let now = Utc::now();
        match outcome {
            ApplyOutcome::Applied => {
                summary.applied += 1;
                self.retry.remove(&pod_key);
                self.push_conditions(pod_id, &[]).await;
                self.events.record(EventType::Normal, "ResizeApplied", &format!("resized container {}", plan.container.container_name), pod_id);
            }
            ApplyOutcome::AppliedPartial { failed_resource, error } => {
                summary.applied += 1;
                summary.failed += 1;
                self.push_conditions(pod_id, &[]).await;
                self.events.record(EventType::Warning, "ResizePartial", &format!("{failed_resource} failed: {error}"), pod_id);
            }
            ApplyOutcome::Deferred { reason, error } => {
                summary.deferred += 1;
                self.retry.enqueue(pod_key, plan.clone(), reason, error.clone(), 0, std::time::Instant::now());
                let mut conditions = Vec::new();
                conditions::set_pending(&mut conditions, reason.as_str(), &error, now);
                self.push_conditions(pod_id, &conditions).await;
                self.events.record(EventType::Warning, "ResizeDeferred", &error, pod_id);
            }
            ApplyOutcome::FailedTerminal { error } => {
                summary.failed += 1;
                self.retry.remove(&pod_key);
                self.push_conditions(pod_id, &[]).await;
                self.events.record(EventType::Warning, "ResizeFailed", &error, pod_id);
            }
            ApplyOutcome::NoOp => {}
        }
    }

    /// Best-effort patch of `status.conditions` to `conditions`, via C9.
    async fn push_conditions(&self, pod_id: &PodId, conditions: &[PodCondition]) {
        if let Err(err) = conditions::push(self.client.as_ref(), pod_id, conditions).await {
            tracing::debug!(pod = %pod_id, error = %err, "failed to update pod status conditions");
        }
    }

    async fn process_retry_tick(&self) {
        let batch = self.retry.snapshot_due(std::time::Instant::now());

        for (pod_key, entry) in batch.expired {
            tracing::info!(pod = %pod_key, error = %entry.original_error, "deferred resize expired past max deferral time");
            let pod_id = pod_id_from_key(&pod_key);
            self.events.record(EventType::Warning, "ResizeExpired", &entry.original_error, &pod_id);
            self.clear_conditions_for(&pod_id).await;
        }
        for (pod_key, entry) in batch.abandoned {
            tracing::info!(pod = %pod_key, attempts = entry.attempts, "deferred resize abandoned past max retries");
            let pod_id = pod_id_from_key(&pod_key);
            self.events.record(EventType::Warning, "ResizeAbandoned", &entry.original_error, &pod_id);
            self.clear_conditions_for(&pod_id).await;
        }
        for (pod_key, entry) in batch.ready {
            self.retry_one(pod_key, entry).await;
        }
    }

    async fn retry_one(&self, pod_key: String, entry: DeferredEntry) {
        let pod_id = pod_id_from_key(&pod_key);
        let pod = match self.client.get_pod(&pod_id).await {
            Ok(pod) => pod,
            Err(err) => {
                tracing::debug!(pod = %pod_id, error = %err, "could not refresh pod for retry, trying again next cycle");
                return;
            }
        };

        let plan = &entry.plan;
        let Some(container_index) = pod.container_index(&plan.container.container_name) else {
            tracing::debug!(pod = %pod_id, "container gone, abandoning deferred resize");
            self.retry.remove(&pod_key);
            return;
        };
        let container = &pod.containers[container_index];

        let outcome = executor::apply(
            self.client.as_ref(),
            &self.apply_guard,
            &pod_id,
            container_index,
            &container.resources,
            container.resize_policy,
            plan,
            &self.config,
        )
        .await;

        match outcome {
            ApplyOutcome::Applied | ApplyOutcome::AppliedPartial { .. } | ApplyOutcome::NoOp => {
                self.retry.remove(&pod_key);
                self.push_conditions(&pod_id, &[]).await;
                self.events.record(EventType::Normal, "ResizeRetrySucceeded", "deferred resize applied", &pod_id);
            }
            ApplyOutcome::Deferred { reason, error } => {
                self.retry.enqueue(pod_key, plan.clone(), reason, error, entry.priority, std::time::Instant::now());
            }
            ApplyOutcome::FailedTerminal { error } => {
                self.retry.remove(&pod_key);
                tracing::warn!(pod = %pod_id, error, "deferred resize failed terminally");
                self.events.record(EventType::Warning, "ResizeFailed", &error, &pod_id);
            }
        }
    }

    async fn clear_conditions_for(&self, pod_id: &PodId) {
        if self.client.get_pod(pod_id).await.is_ok() {
            self.push_conditions(pod_id, &[]).await;
        }
    }

    pub fn retry_stats(&self) -> crate::retry::RetryStats {
        self.retry.stats()
    }
}

fn needs_adjustment(current: &ResourceRequirements, target: &ResourceRequirements) -> bool {
    let cpu = relative_change(current.cpu.request.map(|m| m.0).unwrap_or(0), target.cpu.request.map(|m| m.0).unwrap_or(0));
    let memory = relative_change(current.memory.request.map(|b| b.0).unwrap_or(0), target.memory.request.map(|b| b.0).unwrap_or(0));
    cpu > ADJUSTMENT_THRESHOLD || memory > ADJUSTMENT_THRESHOLD
}

fn relative_change(current: i64, target: i64) -> f64 {
    if current == 0 {
        if target == 0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        ((target - current) as f64 / current as f64).abs()
    }
}

fn pod_id_from_key(key: &str) -> PodId {
    match key.split_once('/') {
        Some((namespace, name)) => PodId::new(namespace, name),
        None => PodId::new("", key),
    }
}
