//! Orchestration loop, executor, retry manager and the other stateful
//! collaborators of the adaptive right-sizing control loop.
//!
//! This crate is the async/stateful half of the pipeline: it consumes the
//! pure functions and types from `right-sizer-core` and wires them to a
//! cluster via the [`client::ClusterClient`]/[`client::MetricsProvider`]/
//! [`client::EventSink`] capability traits, exactly as `kube-runtime`
//! builds its `Controller` on top of `kube-client`'s `Api` without
//! depending on a concrete transport itself.

pub mod cache;
pub mod client;
pub mod conditions;
pub mod controller;
pub mod eligibility;
pub mod error;
pub mod executor;
pub mod parent;
pub mod retry;

pub use cache::LogSuppressionCache;
pub use client::{ClusterClient, EventSink, EventType, MetricsProvider, NullEventSink, PodId, PodSnapshot};
pub use controller::{Controller, TickSummary};
pub use error::{ClientError, MetricsError};
pub use executor::{ApplyGuard, ApplyOutcome, DeferCause};
pub use retry::{DeferredEntry, RetryManager, RetryStats};
