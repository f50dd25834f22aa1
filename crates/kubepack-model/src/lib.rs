//! Kubepack Model - typed views over dynamic cluster documents
//!
//! This crate provides the foundational resource types used throughout
//! kubepack:
//! - `ResourceRef`: the identity of a cluster resource (apiVersion, kind,
//!   namespace, name) with grouping helpers
//! - `Resource`: a decoded API document with typed accessors over its
//!   opaque attribute tree (labels, conditions, rollout counters, ...)
//! - Streaming decoders for YAML/JSON manifests including embedded `List`
//!   kinds, and YAML re-encoding
//! - Channel fan-in for merging watch streams
//! - Manifest source loading (file, directory, URL, stdin)

pub mod decode;
pub mod error;
pub mod merge;
pub mod reference;
pub mod resource;
pub mod source;
pub mod tree;

pub use decode::{JsonStreamDecoder, decode_documents, parse_resources};
pub use error::{ModelError, Result};
pub use merge::merge;
pub use reference::{ResourceRef, filter, group_by_kind, group_by_namespace, names};
pub use resource::{Condition, ContainerStatus, OwnerReference, Resource, to_yaml_stream};
pub use source::read_source;
