//! Error types for the vector index

use thiserror::Error;

/// Result type alias for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Vector index errors
#[derive(Debug, Error)]
pub enum IndexError {
    /// The index was used before `open()` was called
    #[error("index is not ready: call open() before use")]
    NotReady,

    /// The on-disk snapshot could not be decoded; a reindex is required
    #[error("index snapshot is corrupt: {0}")]
    Corrupt(String),

    /// A vector did not match the configured dimensionality
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vectors from a different embedding model than the index was built with
    #[error("embedding model mismatch: index holds '{expected}', got '{actual}'")]
    ModelVersionMismatch { expected: String, actual: String },

    /// Invalid query parameters (caller's fault, never retried)
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// IO error while reading or writing a snapshot
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
