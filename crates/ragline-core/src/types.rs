//! Core types for the vector index

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::distance::Metric;

/// Options for opening a vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Expected embedding dimensionality
    pub dimensions: usize,
    /// Distance metric for query scoring
    #[serde(default)]
    pub metric: Metric,
    /// Identifier/version of the embedding model the index holds vectors for
    pub model_id: String,
    /// Snapshot file path; `None` keeps the index memory-only
    pub snapshot_path: Option<PathBuf>,
}

impl IndexOptions {
    /// Memory-only cosine options for the given model
    pub fn in_memory(dimensions: usize, model_id: impl Into<String>) -> Self {
        Self {
            dimensions,
            metric: Metric::Cosine,
            model_id: model_id.into(),
            snapshot_path: None,
        }
    }
}

/// A single (chunk id, vector, metadata) entry owned by the index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Chunk id, unique across the index (`"{document_id}#{ordinal}"`)
    pub chunk_id: String,
    /// Owning document id, used for document-level deletion
    pub document_id: String,
    /// Embedding vector
    pub vector: Vec<f32>,
    /// Embedding model that produced the vector
    pub model_id: String,
    /// Opaque metadata carried alongside the vector
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A scored query hit, ordered by descending similarity
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Chunk id of the matched entry
    pub chunk_id: String,
    /// Owning document id
    pub document_id: String,
    /// Cosine similarity in `[-1.0, 1.0]`, higher is closer
    pub score: f32,
}
