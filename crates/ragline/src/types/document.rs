//! Document and chunk types

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Source metadata supplied by the ingestion collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Source path or URI the text came from
    pub source_path: Option<String>,
    /// Caller-supplied version tag
    pub version: Option<String>,
    /// Opaque extra metadata
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// An ingested document. Immutable once indexed; a re-ingest of the same
/// id supersedes all prior chunks (delete-then-insert).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable caller-supplied identifier
    pub id: String,
    /// sha256 of the ingested text, used for unchanged-content dedup
    pub content_hash: String,
    /// Source metadata
    pub metadata: DocumentMetadata,
    /// Number of chunks created from this document
    pub total_chunks: u32,
    /// Ingestion timestamp
    pub ingested_at: chrono::DateTime<chrono::Utc>,
}

impl Document {
    /// Create a new document record for the given text
    pub fn new(id: impl Into<String>, text: &str, metadata: DocumentMetadata) -> Self {
        Self {
            id: id.into(),
            content_hash: content_hash(text),
            metadata,
            total_chunks: 0,
            ingested_at: chrono::Utc::now(),
        }
    }
}

/// sha256 hex digest of a text
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// A bounded text segment of a document, the unit of embedding and
/// retrieval. Created by the chunker and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk id: `"{document_id}#{ordinal:04}"`
    pub id: String,
    /// Owning document id
    pub document_id: String,
    /// Text span
    pub text: String,
    /// Character offset of the span start in the source document
    pub char_start: usize,
    /// Character offset one past the span end
    pub char_end: usize,
    /// Characters shared with the end of the previous chunk
    pub overlap_with_previous: usize,
    /// Position within the document, stable and order-preserving
    pub ordinal: u32,
}

impl Chunk {
    /// Create a chunk; the id is derived from the document id and ordinal
    pub fn new(
        document_id: &str,
        text: String,
        char_start: usize,
        char_end: usize,
        overlap_with_previous: usize,
        ordinal: u32,
    ) -> Self {
        Self {
            id: format!("{}#{:04}", document_id, ordinal),
            document_id: document_id.to_string(),
            text,
            char_start,
            char_end,
            overlap_with_previous,
            ordinal,
        }
    }

    /// Estimated token count of the chunk text
    pub fn estimated_tokens(&self) -> usize {
        super::estimate_tokens(&self.text)
    }

    /// Serialize the chunk into index-entry metadata
    pub fn to_index_metadata(&self) -> HashMap<String, serde_json::Value> {
        let mut meta = HashMap::new();
        meta.insert("chunk_id".to_string(), serde_json::json!(self.id));
        meta.insert(
            "document_id".to_string(),
            serde_json::json!(self.document_id),
        );
        meta.insert("text".to_string(), serde_json::json!(self.text));
        meta.insert("char_start".to_string(), serde_json::json!(self.char_start));
        meta.insert("char_end".to_string(), serde_json::json!(self.char_end));
        meta.insert(
            "overlap_with_previous".to_string(),
            serde_json::json!(self.overlap_with_previous),
        );
        meta.insert("ordinal".to_string(), serde_json::json!(self.ordinal));
        meta
    }

    /// Rebuild a chunk from index-entry metadata
    pub fn from_index_metadata(
        chunk_id: &str,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> Result<Self> {
        let text = metadata
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::internal(format!("chunk {} has no text metadata", chunk_id)))?
            .to_string();
        let document_id = metadata
            .get("document_id")
            .and_then(|v| v.as_str())
            .unwrap_or_else(|| chunk_id.split('#').next().unwrap_or(chunk_id))
            .to_string();

        Ok(Self {
            id: chunk_id.to_string(),
            document_id,
            text,
            char_start: metadata
                .get("char_start")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize,
            char_end: metadata
                .get("char_end")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize,
            overlap_with_previous: metadata
                .get("overlap_with_previous")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as usize,
            ordinal: metadata.get("ordinal").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        })
    }
}
