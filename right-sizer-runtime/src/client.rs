//! Capability boundary with the cluster: the collaborator traits named in
//! §6. This crate ships no concrete implementation — wiring one of these
//! against a real API server (e.g. on top of `kube::Client`) is a
//! packaging concern left to the operator binary.

use crate::error::{ClientError, MetricsError};
use async_trait::async_trait;
use json_patch::Patch;
use right_sizer_core::patch::RawResources;
use right_sizer_core::UsageSample;
use std::collections::BTreeMap;

/// A namespaced pod identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PodId {
    pub namespace: String,
    pub name: String,
}

impl PodId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        PodId { namespace: namespace.into(), name: name.into() }
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl std::fmt::Display for PodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Per-resource restart requirement declared by a container's resize
/// policy (see GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    NotRequired,
    RestartContainer,
}

/// A container's declared resize policy for CPU and memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePolicy {
    pub cpu: RestartPolicy,
    pub memory: RestartPolicy,
}

impl ResizePolicy {
    /// The default a freshly-created container has if its template never
    /// set a resize policy explicitly: both resources require a restart.
    pub fn restart_required() -> Self {
        ResizePolicy { cpu: RestartPolicy::RestartContainer, memory: RestartPolicy::RestartContainer }
    }

    pub fn not_required() -> Self {
        ResizePolicy { cpu: RestartPolicy::NotRequired, memory: RestartPolicy::NotRequired }
    }

    pub fn permits_memory_decrease(&self) -> bool {
        self.memory == RestartPolicy::RestartContainer
    }
}

/// A snapshot of one container as seen by the cluster client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSnapshot {
    pub name: String,
    pub resources: RawResources,
    pub resize_policy: ResizePolicy,
}

/// Coarse pod phase, enough to drive eligibility (C10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

/// The kind of workload controller that owns a pod's template, used by the
/// parent-template updater (C5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    ReplicaSet,
}

/// A reference to an owning workload controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadRef {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
}

/// A snapshot of a pod, as handed to the eligibility filter, decision
/// engine and executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSnapshot {
    pub id: PodId,
    pub generation: i64,
    pub phase: PodPhase,
    pub deleting: bool,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub owner: Option<WorkloadRef>,
    pub containers: Vec<ContainerSnapshot>,
}

impl PodSnapshot {
    pub fn container_resources(&self) -> Vec<right_sizer_core::ResourceRequirements> {
        self.containers.iter().map(|c| c.resources.cpu_requirements()).collect()
    }

    pub fn container_index(&self, name: &str) -> Option<usize> {
        self.containers.iter().position(|c| c.name == name)
    }
}

/// The parent template's container-level resize policy, as read/written by
/// the parent-template updater (C5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadTemplate {
    pub workload: WorkloadRef,
    pub container_resize_policies: BTreeMap<String, ResizePolicy>,
    pub owner: Option<WorkloadRef>,
}

/// Everything the core needs from the Kubernetes API: listing/fetching
/// pods and their owning workloads, and issuing the two kinds of patch the
/// pipeline emits (a standard patch, and a patch against the pod resize
/// subresource).
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn list_pods(&self) -> Result<Vec<PodSnapshot>, ClientError>;
    async fn get_pod(&self, id: &PodId) -> Result<PodSnapshot, ClientError>;

    /// Apply a standard (non-resize-subresource) patch to a pod — used for
    /// the resize-policy prelude (Phase 0) and for status-condition
    /// updates.
    async fn patch_pod(&self, id: &PodId, patch: Patch) -> Result<(), ClientError>;

    /// Apply a patch against the pod's **resize** subresource — used for
    /// the CPU and memory phases of an in-place resize.
    async fn patch_pod_resize(&self, id: &PodId, patch: Patch) -> Result<(), ClientError>;

    async fn get_workload_template(&self, owner: &WorkloadRef) -> Result<Option<WorkloadTemplate>, ClientError>;
    async fn patch_workload_template(&self, workload: &WorkloadRef, patch: Patch) -> Result<(), ClientError>;

    /// Probe the server's minor version once at start; the orchestration
    /// loop uses this to decide whether in-place resize is available at
    /// all (§6 platform version guard).
    async fn server_minor_version(&self) -> Result<u32, ClientError>;
}

/// Pod-level usage sampling, consumed once per pod per tick.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn fetch_pod_metrics(&self, id: &PodId) -> Result<UsageSample, MetricsError>;
}

/// The kind of abstract event the core can emit; mirrors Kubernetes'
/// `Normal`/`Warning` event type split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// Abstract event sink for the named events in §6 ("ResizeDeferred",
/// "ResizeExpired", "ResizeAbandoned", "ResizeRetrySucceeded", ...). A
/// concrete sink might forward these to Kubernetes events, Prometheus
/// counters, or an audit log; all are out of scope here.
pub trait EventSink: Send + Sync {
    fn record(&self, event_type: EventType, reason: &str, message: &str, pod: &PodId);
}

/// An [`EventSink`] that discards every event; useful as a default and in
/// tests that don't care about the emitted surface.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn record(&self, _event_type: EventType, _reason: &str, _message: &str, _pod: &PodId) {}
}
