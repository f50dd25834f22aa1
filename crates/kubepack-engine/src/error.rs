//! Error types for kubepack-engine

use thiserror::Error;

use kubepack_kubectl::ClientError;
use kubepack_model::ModelError;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while reconciling packages
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Applying a package failed
    #[error("apply package {name}: {source}")]
    Apply {
        name: String,
        #[source]
        source: Box<EngineError>,
    },

    /// Deleting a package failed
    #[error("delete package {name}: {source}")]
    Delete {
        name: String,
        #[source]
        source: Box<EngineError>,
    },

    /// No installed-package record exists under the given name
    #[error("app {namespace}/{name} not found")]
    AppNotFound { namespace: String, name: String },

    /// The tracker reported non-ready resources at end of stream
    #[error("{count} resources did not meet condition")]
    NotReady { count: usize },

    /// The manifest contained nothing to work with
    #[error("no objects found in the provided manifest")]
    NoObjects,

    /// A resource carries no package name label and none was provided
    #[error("{id} declares no package name label {label}")]
    MissingNameLabel { id: String, label: String },

    /// Resources disagree about the package they belong to
    #[error("resources contain different values for package name label {label}")]
    ConflictingNames { label: String },

    /// Two resources share one identity within a package
    #[error("duplicate resource {id} in package")]
    DuplicateResource { id: String },

    /// An installed-package record could not be materialized
    #[error("read app record {name}: {message}")]
    InvalidRecord { name: String, message: String },

    /// A registry operation against the cluster failed
    #[error("{op} app record {namespace}/{name}: {source}")]
    Record {
        op: &'static str,
        namespace: String,
        name: String,
        #[source]
        source: Box<EngineError>,
    },

    /// Cluster client error
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Resource model error
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl EngineError {
    pub fn apply(name: impl Into<String>, source: EngineError) -> Self {
        Self::Apply {
            name: name.into(),
            source: Box::new(source),
        }
    }

    pub fn delete(name: impl Into<String>, source: EngineError) -> Self {
        Self::Delete {
            name: name.into(),
            source: Box::new(source),
        }
    }

    pub fn record(
        op: &'static str,
        namespace: impl Into<String>,
        name: impl Into<String>,
        source: EngineError,
    ) -> Self {
        Self::Record {
            op,
            namespace: namespace.into(),
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// True when the package record was not found
    pub fn is_app_not_found(&self) -> bool {
        match self {
            EngineError::AppNotFound { .. } => true,
            EngineError::Apply { source, .. }
            | EngineError::Delete { source, .. }
            | EngineError::Record { source, .. } => source.is_app_not_found(),
            _ => false,
        }
    }

    /// True when the underlying cause is cancellation or deadline expiry
    pub fn is_cancelled(&self) -> bool {
        match self {
            EngineError::Client(e) => e.is_cancelled(),
            EngineError::Apply { source, .. }
            | EngineError::Delete { source, .. }
            | EngineError::Record { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}
