//! Kubepack Status - readiness evaluation
//!
//! Maps heterogeneous resource status shapes onto a single
//! `ConditionStatus {ready, description}` verdict and aggregates
//! per-resource verdicts into a whole-package one:
//! - **Conditions**: kind-specific readiness rules (deployment rollout,
//!   daemonset rollout, named single conditions) with a generic fallback
//! - **Emitter**: turns a resource observation stream into a stream of
//!   genuine status changes per resource identity
//! - **Tracker**: declares a required set ready the moment every member is
//!   simultaneously ready and reports the final per-resource state

pub mod condition;
pub mod emitter;
pub mod tracker;

pub use condition::{Condition, ConditionMap, ConditionStatus, condition_for, rollout_conditions};
pub use emitter::{ResourceStatus, StatusEvent, emit_changes};
pub use tracker::{StatusReport, TrackedResource, Tracker, track};
