//! Error types for the container

use thiserror::Error;
use weft_core::Token;
use weft_graph::GraphError;

/// Result type alias for container operations
pub type DiResult<T> = Result<T, DiError>;

/// Errors that can occur while running a container or resolving providers
#[derive(Error, Debug)]
pub enum DiError {
    /// Resolution or graph access before `run`
    #[error("Container has not been compiled; call `run` first")]
    NotCompiled,

    /// Graph compilation failed
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A constructor or factory returned an error
    #[error("Failed to instantiate {token}: {source}")]
    InstantiationFailed {
        token: Token,
        #[source]
        source: anyhow::Error,
    },

    /// The init hook of a constructed instance failed
    #[error("Init hook of {token} failed: {source}")]
    InitHookFailed {
        token: Token,
        #[source]
        source: anyhow::Error,
    },

    /// The resolved instance is not of the requested type
    #[error("Provider {token} does not produce a {expected}")]
    TypeMismatch {
        token: Token,
        expected: &'static str,
    },

    /// Configuration or manifest error
    #[error("Configuration error: {0}")]
    Config(String),
}
