//! Adaptive container right-sizing for Kubernetes.
//!
//! This crate is a thin facade re-exporting [`right_sizer_core`] (the pure
//! decision engine, resource calculator and patch synthesizer) and
//! [`right_sizer_runtime`] (the orchestration loop, executor, retry
//! manager and other stateful collaborators), mirroring the way the
//! top-level `kube` crate re-exports `kube-core` and `kube-runtime` behind
//! a single dependency. Building an operator binary against a real
//! cluster means implementing [`runtime::ClusterClient`],
//! [`runtime::MetricsProvider`] and, optionally, [`runtime::EventSink`]
//! against the target API — wiring those to an HTTP client is out of
//! scope for this crate, as it is for `kube-runtime`'s `Controller` with
//! respect to `kube-client`'s transport.

pub use right_sizer_core as core;
pub use right_sizer_runtime as runtime;

pub use right_sizer_core::{
    Config, ContainerRef, QosClass, ResizePlan, ResourceAmount, ResourceRequirements, ScaleDirection, ScalingDecision,
    UsageSample,
};
pub use right_sizer_runtime::{
    ApplyGuard, ApplyOutcome, ClientError, ClusterClient, Controller, DeferCause, DeferredEntry, EventSink, EventType,
    LogSuppressionCache, MetricsError, MetricsProvider, NullEventSink, PodId, PodSnapshot, RetryManager, RetryStats,
    TickSummary,
};
