//! CLI error type
//!
//! Collects the error surfaces of the lower layers into one type that is
//! logged exactly once at the outermost boundary. Argument errors map to
//! exit code 1, every other failure to a non-zero code as well.

use miette::Diagnostic;
use thiserror::Error;

use kubepack_engine::EngineError;
use kubepack_kubectl::ClientError;
use kubepack_model::ModelError;

/// Result type for CLI commands
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    /// Invalid argument combination
    #[error("{0}")]
    #[diagnostic(code(kubepack::cli::args))]
    Args(String),

    /// The external overlay renderer failed
    #[error("render overlay source {source_path}: {message}")]
    #[diagnostic(code(kubepack::cli::overlay))]
    Overlay {
        source_path: String,
        message: String,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("IO error: {0}")]
    #[diagnostic(code(kubepack::cli::io))]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn args(message: impl Into<String>) -> Self {
        Self::Args(message.into())
    }
}
