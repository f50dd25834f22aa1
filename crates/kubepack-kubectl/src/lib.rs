//! Kubepack Kubectl - the cluster client
//!
//! This crate adapts the platform CLI (`kubectl`) into a typed, cancellable
//! client interface:
//! - **`Kubectl` trait**: apply, delete, await-deletion, get, watch,
//!   resource types and container logs
//! - **Child-process supervision**: every invocation propagates context
//!   cancellation to process termination and captures stderr in full
//! - **Typed errors**: non-zero exits carry their stderr lines; lookups that
//!   yield nothing map to a distinguished `NotFound`
//! - **Timeout propagation**: the remaining context budget is forwarded to
//!   the child as a duration flag

pub mod apiresources;
pub mod client;
pub mod context;
pub mod error;
mod exec;

pub use apiresources::ApiResourceType;
pub use client::{Kubectl, KubectlClient, ResourceEvent};
pub use context::Context;
pub use error::{ClientError, Result};
