//! Retrieval and answer output types

use serde::{Deserialize, Serialize};

use super::document::Chunk;

/// A retrieved chunk with its similarity score; produced fresh per query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// The retrieved chunk
    pub chunk: Chunk,
    /// Cosine similarity against the query (higher is closer)
    pub similarity: f32,
}

/// Citation of a source chunk used in an answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Chunk id
    pub chunk_id: String,
    /// Owning document id
    pub document_id: String,
    /// Exact snippet from the source
    pub snippet: String,
    /// Similarity score at retrieval time
    pub similarity: f32,
}

impl Citation {
    /// Build a citation from a retrieved chunk
    pub fn from_scored(scored: &ScoredChunk) -> Self {
        Self {
            chunk_id: scored.chunk.id.clone(),
            document_id: scored.chunk.document_id.clone(),
            snippet: scored.chunk.text.clone(),
            similarity: scored.similarity,
        }
    }
}

/// Terminal status of an answer stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AnswerStatus {
    /// The backend stream finished normally
    Completed,
    /// The caller cancelled mid-generation; `answer` holds the partial text
    Cancelled,
    /// The stream terminated abnormally; `answer` holds the partial text
    /// and this marker makes the truncation explicit
    Failed { message: String },
}

/// Final outcome of a query, exposed so an external feedback store can key
/// records by (query, answer, citations)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOutcome {
    /// The query that was answered
    pub query: String,
    /// Full answer text (partial if cancelled or failed)
    pub answer: String,
    /// Ordered cited chunk ids
    pub cited_chunk_ids: Vec<String>,
    /// Citations with snippets
    pub citations: Vec<Citation>,
    /// How the stream ended
    pub status: AnswerStatus,
}

/// Report returned by a successful ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Document id that was ingested
    pub document_id: String,
    /// Chunks written to the index
    pub chunks_indexed: usize,
    /// True when the text was byte-identical to the indexed version and
    /// ingestion was skipped
    pub skipped_unchanged: bool,
    /// Entries of a prior version removed before re-indexing
    pub superseded_chunks: usize,
}

/// Knowledge-base introspection snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Distinct documents in the index
    pub documents: usize,
    /// Total chunk entries
    pub chunks: usize,
    /// Embedding model the index holds vectors for
    pub embedding_model: String,
}
