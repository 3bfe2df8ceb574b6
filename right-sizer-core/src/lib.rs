//! Decision engine, resource calculator and safe-patch synthesizer for an
//! adaptive container right-sizing control loop.
//!
//! This crate is the pure, synchronous half of the pipeline described by
//! the workspace: `(usage, current resources, config) -> sanitized target`.
//! It has no knowledge of the Kubernetes API, retries, or scheduling —
//! those concerns live in `right-sizer-runtime`, which consumes the types
//! and functions exported here.

pub mod calculator;
pub mod config;
pub mod decision;
pub mod patch;
pub mod qos;
pub mod quantity;
pub mod types;

pub use config::Config;
pub use types::{
    ContainerRef, QosClass, ResizePlan, ResourceAmount, ResourceRequirements, ScaleDirection, ScalingDecision,
    UsageSample,
};
