//! Error types for kubepack-kubectl

use thiserror::Error;

/// Result type for cluster client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while driving the platform CLI
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The child process exited non-zero. Carries the captured stderr lines.
    #[error("{command}: {message}")]
    Exec {
        command: String,
        message: String,
        stderr: Vec<String>,
    },

    /// A lookup yielded nothing
    #[error("resource {namespace}:{kind}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    /// The child's output could not be parsed
    #[error("parse {what}: {message}")]
    Parse { what: String, message: String },

    /// A manifest or JSON stream was rejected by the decoder
    #[error(transparent)]
    Model(#[from] kubepack_model::ModelError),

    /// The context was cancelled by the user
    #[error("context cancelled")]
    Cancelled,

    /// The context deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn parse(what: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }

    /// True for the distinguished empty-lookup error
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    /// True for cancellation and deadline expiry
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled | ClientError::DeadlineExceeded)
    }
}
