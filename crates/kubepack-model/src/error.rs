//! Error types for kubepack-model

use thiserror::Error;

/// Result type for kubepack-model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur while decoding, encoding or loading resources
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The decoder rejected a manifest document
    #[error("parse manifest: {0}")]
    Parse(String),

    /// A decoded document misses one of the mandatory identity fields
    #[error("invalid API object: apiVersion, kind or name are not set: {0}")]
    InvalidObject(String),

    /// A resource failed to encode back to YAML
    #[error("encode {kind}/{name} to yaml: {message}")]
    Encode {
        kind: String,
        name: String,
        message: String,
    },

    /// A manifest source could not be read
    #[error("source {location}: {message}")]
    Source { location: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn source(source: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Source {
            location: source.into(),
            message: message.to_string(),
        }
    }
}
