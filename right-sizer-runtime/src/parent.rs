//! C5 — the parent-template updater.
//!
//! Walks a pod's owner chain (ReplicaSet -> Deployment, or directly
//! StatefulSet/DaemonSet), correcting each owning controller's pod
//! template to declare an explicit `NotRequired` resize policy for CPU
//! and memory, so that future resizes never trigger a restart (I8).
//! Invoked from the orchestration loop's Phase 0 only when
//! `Config::update_resize_policy` is set; any error it returns is logged
//! and swallowed by the caller, exactly like the pod-level prelude in
//! [`crate::executor`].

use crate::client::{ClusterClient, ResizePolicy, RestartPolicy, WorkloadRef, WorkloadTemplate};
use crate::conditions::RESIZE_POLICY_ADDED_ANNOTATION;
use crate::error::ClientError;
use chrono::{DateTime, Utc};
use json_patch::{AddOperation, Patch, PatchOperation};
use jsonptr::PointerBuf;

/// Outcome of walking and correcting one pod's owner chain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParentUpdateSummary {
    pub patched: Vec<WorkloadRef>,
    pub hit_orphan: bool,
}

fn target_policy() -> ResizePolicy {
    ResizePolicy { cpu: RestartPolicy::NotRequired, memory: RestartPolicy::NotRequired }
}

fn needs_patch(template: &WorkloadTemplate) -> bool {
    template.container_resize_policies.values().any(|p| *p != target_policy())
}

/// Build the JSON Patch correcting every out-of-policy container and
/// stamping the marker annotation. Containers are addressed by their
/// position in `container_resize_policies`'s name-sorted iteration order,
/// the only ordering this trait boundary exposes — a concrete
/// implementation resolves this against the real, positional containers
/// array before sending the patch on.
fn build_patch(template: &WorkloadTemplate, now: DateTime<Utc>) -> Patch {
    let mut ops = Vec::new();
    for (index, policy) in template.container_resize_policies.values().enumerate() {
        if *policy == target_policy() {
            continue;
        }
        ops.push(PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["spec", "template", "spec", "containers", &index.to_string(), "resizePolicy"]),
            value: serde_json::json!([
                { "resourceName": "cpu", "restartPolicy": "NotRequired" },
                { "resourceName": "memory", "restartPolicy": "NotRequired" },
            ]),
        }));
    }
    ops.push(PatchOperation::Add(AddOperation {
        path: PointerBuf::from_tokens(["spec", "template", "metadata", "annotations", RESIZE_POLICY_ADDED_ANNOTATION]),
        value: serde_json::Value::String(now.to_rfc3339()),
    }));
    Patch(ops)
}

/// Walk `start`'s owner chain, correcting the resize policy of every
/// controller that needs it (I8), tolerating an orphaned link anywhere in
/// the chain — most commonly a `ReplicaSet` whose owning `Deployment` has
/// since been deleted (§9 "Cyclic ownership walk").
pub async fn update_chain(client: &dyn ClusterClient, start: &WorkloadRef, now: DateTime<Utc>) -> Result<ParentUpdateSummary, ClientError> {
    let mut summary = ParentUpdateSummary::default();
    let mut current = Some(start.clone());

    while let Some(workload) = current {
        let template = match client.get_workload_template(&workload).await? {
            Some(t) => t,
            None => {
                tracing::debug!(?workload, "owner chain ended in an orphan, stopping");
                summary.hit_orphan = true;
                break;
            }
        };

        if needs_patch(&template) {
            let patch = build_patch(&template, now);
            client.patch_workload_template(&workload, patch).await?;
            summary.patched.push(workload.clone());
        }

        current = template.owner;
    }

    Ok(summary)
}
