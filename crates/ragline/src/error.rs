//! Error types for the RAG engine

use thiserror::Error;

/// Result type alias for RAG operations
pub type Result<T> = std::result::Result<T, Error>;

/// RAG engine errors
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid parameters; caller's fault, never retried
    #[error("configuration error: {0}")]
    Config(String),

    /// An embedding/index/model backend is unreachable; the caller may
    /// retry with backoff, the engine itself never does
    #[error("{backend} backend unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    /// Malformed embedding input, not retried
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Vector index error
    #[error(transparent)]
    Index(#[from] ragline_core::IndexError),

    /// Mid-stream generation fault; `partial` holds whatever output the
    /// backend produced before the stream terminated abnormally
    #[error("generation failed: {message}")]
    Generation { message: String, partial: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a backend-unavailable error
    pub fn backend_unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a generation error carrying partial output
    pub fn generation(message: impl Into<String>, partial: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
            partial: partial.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
