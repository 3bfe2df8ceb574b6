//! Core data types shared by the decision engine, resource calculator and
//! patch synthesizer.

use crate::quantity::{Bytes, Millicores};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single pod-level usage sample, as produced by the metrics provider.
///
/// Usage is reported per pod, not per container; the resource calculator
/// distributes it equally across the pod's containers.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct UsageSample {
    pub cpu_millicores: f64,
    pub memory_mib: f64,
}

impl UsageSample {
    pub fn cpu(self) -> Millicores {
        Millicores::from_cores_f64(self.cpu_millicores / 1000.0)
    }

    pub fn memory(self) -> Bytes {
        Bytes::from_mib_f64(self.memory_mib)
    }

    /// Split this pod-level sample evenly across `container_count`
    /// containers. `container_count` of zero is treated as one.
    pub fn per_container(self, container_count: usize) -> UsageSample {
        let n = container_count.max(1) as f64;
        UsageSample {
            cpu_millicores: self.cpu_millicores / n,
            memory_mib: self.memory_mib / n,
        }
    }
}

/// A request/limit pair for a single resource type (CPU or memory), in
/// canonical integer units. `None` means the field is absent from the
/// container spec, which is distinct from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceAmount<T> {
    pub request: Option<T>,
    pub limit: Option<T>,
}

impl<T: Copy> ResourceAmount<T> {
    pub fn present(&self) -> bool {
        self.request.is_some() || self.limit.is_some()
    }
}

/// Requests/limits for CPU and memory on a single container, in canonical
/// integer units. Other resource types (GPU, ephemeral-storage, ...) are
/// not represented here: they are never computed by the calculator and are
/// only ever copied verbatim by the patch synthesizer from the live
/// container spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceRequirements {
    pub cpu: ResourceAmount<Millicores>,
    pub memory: ResourceAmount<Bytes>,
}

/// Per-resource scaling verdict produced by the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ScaleDirection {
    ScaleUp,
    ScaleDown,
    ScaleNone,
}

impl fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleDirection::ScaleUp => write!(f, "ScaleUp"),
            ScaleDirection::ScaleDown => write!(f, "ScaleDown"),
            ScaleDirection::ScaleNone => write!(f, "ScaleNone"),
        }
    }
}

/// The decision engine's verdict for one container: an independent
/// direction for CPU and for memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingDecision {
    pub cpu: ScaleDirection,
    pub memory: ScaleDirection,
}

impl ScalingDecision {
    pub fn none() -> Self {
        ScalingDecision {
            cpu: ScaleDirection::ScaleNone,
            memory: ScaleDirection::ScaleNone,
        }
    }

    /// A memory-only decrease on an otherwise-stable container is never
    /// worth a disruptive in-place attempt; see decision engine §4.1.
    pub fn is_suppressed(&self) -> bool {
        self.cpu == ScaleDirection::ScaleNone && self.memory == ScaleDirection::ScaleDown
    }

    pub fn is_none(&self) -> bool {
        self.cpu == ScaleDirection::ScaleNone && self.memory == ScaleDirection::ScaleNone
    }
}

/// Derived Quality-of-Service class of a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosClass {
    Guaranteed,
    Burstable,
    BestEffort,
}

/// A fully-identified container within a pod, used as the unit of work
/// throughout the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub namespace: String,
    pub pod_name: String,
    pub container_name: String,
    pub container_index: usize,
}

impl ContainerRef {
    /// The `"<ns>/<pod>/<container>"` key used by the log-suppression
    /// cache.
    pub fn cache_key(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.pod_name, self.container_name)
    }

    /// The `"<ns>/<pod>"` key used by the deferred-resize queue.
    pub fn pod_key(&self) -> String {
        format!("{}/{}", self.namespace, self.pod_name)
    }
}

/// An internal resize plan for a single container, produced once the
/// calculator and patch synthesizer have agreed on a sanitized target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizePlan {
    pub container: ContainerRef,
    pub old_resources: ResourceRequirements,
    pub new_resources: ResourceRequirements,
    pub reason: String,
}

impl ResizePlan {
    /// Whether applying this plan would mutate anything at all (used for
    /// the idempotence short-circuit, L5).
    pub fn is_noop(&self) -> bool {
        self.old_resources == self.new_resources
    }

    pub fn cpu_changed(&self) -> bool {
        self.old_resources.cpu != self.new_resources.cpu
    }

    pub fn memory_changed(&self) -> bool {
        self.old_resources.memory != self.new_resources.memory
    }
}
