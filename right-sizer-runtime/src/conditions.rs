//! C9 — the pod-status condition manager.
//!
//! Pure helpers over a pod's condition list and annotation map, plus [`push`]
//! to patch the result back via [`crate::client::ClusterClient::patch_pod`].
//! The caller (the executor, C4, and the orchestration loop, C6) is
//! responsible for fetching the current conditions and applying these
//! mutations before calling [`push`].

use crate::client::{ClusterClient, EventType, PodId};
use crate::error::ClientError;
use chrono::{DateTime, Utc};
use json_patch::{Patch, PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use std::collections::BTreeMap;

pub const OBSERVED_GENERATION_ANNOTATION: &str = "right-sizer/observed-generation";
pub const LAST_RESIZE_EVENT_ANNOTATION: &str = "right-sizer/last-resize-event";
pub const RESIZE_POLICY_ADDED_ANNOTATION: &str = "right-sizer/resize-policy-added";

/// The two mutually-exclusive condition kinds this crate manages (I5/L6).
/// A pod may carry any number of other conditions; this crate never
/// inspects or mutates those.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    ResizePending,
    ResizeInProgress,
}

impl ConditionKind {
    fn type_name(self) -> &'static str {
        match self {
            ConditionKind::ResizePending => "PodResizePending",
            ConditionKind::ResizeInProgress => "PodResizeInProgress",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A single pod condition, in the shape Kubernetes' `PodCondition` takes:
/// type, status, reason, message and a last-transition timestamp that is
/// only updated when the status actually flips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodCondition {
    pub type_name: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

/// Remove any condition of `kind` from `conditions`.
fn remove(conditions: &mut Vec<PodCondition>, kind: ConditionKind) {
    conditions.retain(|c| c.type_name != kind.type_name());
}

/// Insert or update the condition of `kind`, preserving
/// `last_transition_time` if the status is unchanged and refreshing it
/// otherwise.
fn upsert(conditions: &mut Vec<PodCondition>, kind: ConditionKind, status: ConditionStatus, reason: &str, message: &str, now: DateTime<Utc>) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_name == kind.type_name()) {
        if existing.status != status {
            existing.last_transition_time = now;
        }
        existing.status = status;
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        return;
    }
    conditions.push(PodCondition {
        type_name: kind.type_name().to_string(),
        status,
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: now,
    });
}

/// Set `PodResizePending=True`, clearing any `PodResizeInProgress` (I5).
pub fn set_pending(conditions: &mut Vec<PodCondition>, reason: &str, message: &str, now: DateTime<Utc>) {
    remove(conditions, ConditionKind::ResizeInProgress);
    upsert(conditions, ConditionKind::ResizePending, ConditionStatus::True, reason, message, now);
}

/// Set `PodResizeInProgress=True`, clearing any `PodResizePending` (I5).
pub fn set_in_progress(conditions: &mut Vec<PodCondition>, reason: &str, message: &str, now: DateTime<Utc>) {
    remove(conditions, ConditionKind::ResizePending);
    upsert(conditions, ConditionKind::ResizeInProgress, ConditionStatus::True, reason, message, now);
}

/// Remove both managed conditions, e.g. on success or terminal failure.
pub fn clear(conditions: &mut Vec<PodCondition>) {
    remove(conditions, ConditionKind::ResizePending);
    remove(conditions, ConditionKind::ResizeInProgress);
}

/// Set `PodResizeInProgress` with a standardized, human-readable message
/// for the named phase (e.g. `update_progress(.., "web", "CPU", "applying")`
/// -> `"Resizing CPU resources for container web (applying)"`).
pub fn update_progress(conditions: &mut Vec<PodCondition>, container: &str, resource: &str, phase: &str, now: DateTime<Utc>) {
    let message = format!("Resizing {resource} resources for container {container} ({phase})");
    set_in_progress(conditions, "ResizeInProgress", &message, now);
}

/// Patch a pod's `status.conditions` to exactly `conditions`, best-effort.
///
/// Since `ClusterClient` exposes no read of a pod's *live* conditions, this
/// does not merge against conditions set by other controllers — a concrete
/// client implementation wanting that safety should fetch-then-merge before
/// calling `patch_pod`.
pub async fn push(client: &dyn ClusterClient, pod_id: &PodId, conditions: &[PodCondition]) -> Result<(), ClientError> {
    let value = serde_json::Value::Array(conditions.iter().map(condition_json).collect());
    let patch = Patch(vec![PatchOperation::Replace(ReplaceOperation {
        path: PointerBuf::from_tokens(["status", "conditions"]),
        value,
    })]);
    client.patch_pod(pod_id, patch).await
}

fn condition_json(c: &PodCondition) -> serde_json::Value {
    let status = match c.status {
        ConditionStatus::True => "True",
        ConditionStatus::False => "False",
        ConditionStatus::Unknown => "Unknown",
    };
    serde_json::json!({
        "type": c.type_name,
        "status": status,
        "reason": c.reason,
        "message": c.message,
        "lastTransitionTime": c.last_transition_time.to_rfc3339(),
    })
}

pub fn has_both_pending_and_in_progress(conditions: &[PodCondition]) -> bool {
    let pending = conditions.iter().any(|c| c.type_name == ConditionKind::ResizePending.type_name() && c.status == ConditionStatus::True);
    let in_progress = conditions
        .iter()
        .any(|c| c.type_name == ConditionKind::ResizeInProgress.type_name() && c.status == ConditionStatus::True);
    pending && in_progress
}

/// Record the last-seen pod-spec generation this controller acted on.
pub fn set_observed_generation(annotations: &mut BTreeMap<String, String>, generation: i64) {
    annotations.insert(OBSERVED_GENERATION_ANNOTATION.to_string(), generation.to_string());
}

/// Whether the pod's spec generation has moved since we last observed it
/// (an external actor changed the pod out from under us).
pub fn is_spec_changed(annotations: &BTreeMap<String, String>, current_generation: i64) -> bool {
    match annotations.get(OBSERVED_GENERATION_ANNOTATION) {
        Some(stored) => stored.parse::<i64>().map(|g| g != current_generation).unwrap_or(true),
        None => true,
    }
}

/// Record a forensic-trail annotation for an outcome, per the
/// `"<type>|<reason>|<message>|<RFC3339>"` format in §6.
pub fn record_resize_event(annotations: &mut BTreeMap<String, String>, event_type: EventType, reason: &str, message: &str, now: DateTime<Utc>) {
    let type_str = match event_type {
        EventType::Normal => "Normal",
        EventType::Warning => "Warning",
    };
    let value = format!("{type_str}|{reason}|{message}|{}", now.to_rfc3339());
    annotations.insert(LAST_RESIZE_EVENT_ANNOTATION.to_string(), value);
}

/// Stamp the marker annotation on a parent template once its resize policy
/// has been corrected (I8).
pub fn mark_resize_policy_added(annotations: &mut BTreeMap<String, String>, now: DateTime<Utc>) {
    annotations.insert(RESIZE_POLICY_ADDED_ANNOTATION.to_string(), now.to_rfc3339());
}
