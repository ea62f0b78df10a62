//! Configuration for the RAG engine
//!
//! All knobs live in one explicit struct handed to the pipeline at
//! construction; components never read the process environment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Embedding configuration
    pub embedding: EmbeddingConfig,
    /// LLM backend configuration
    pub llm: LlmConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Prompt assembly configuration
    pub prompt: PromptConfig,
    /// Vector index configuration
    pub index: IndexConfig,
}

impl RagConfig {
    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.retrieval.top_k == 0 {
            return Err(Error::config("retrieval.top_k must be >= 1"));
        }
        if self.retrieval.overfetch_factor == 0 {
            return Err(Error::config("retrieval.overfetch_factor must be >= 1"));
        }
        if self.embedding.dimensions == 0 {
            return Err(Error::config("embedding.dimensions must be >= 1"));
        }
        Ok(())
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub max_chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub overlap_size: usize,
}

impl ChunkingConfig {
    /// Validate the size/overlap policy: `0 <= overlap < max_chunk_size`
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(Error::config("chunking.max_chunk_size must be > 0"));
        }
        if self.overlap_size >= self.max_chunk_size {
            return Err(Error::config(format!(
                "chunking.overlap_size ({}) must be smaller than max_chunk_size ({})",
                self.overlap_size, self.max_chunk_size
            )));
        }
        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1024,
            overlap_size: 200,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding model name
    pub model: String,
    /// Embedding dimensionality (768 for nomic-embed-text)
    pub dimensions: usize,
    /// Batch size for embedding calls
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            batch_size: 32,
        }
    }
}

/// LLM backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend base URL
    pub base_url: String,
    /// Generation model name
    pub generate_model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            generate_model: "command-r".to_string(),
            temperature: 0.3,
            timeout_secs: 300,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks to hand to the prompt assembler
    pub top_k: usize,
    /// Candidate over-fetch multiplier; mitigates post-filtering loss
    pub overfetch_factor: usize,
    /// Context window budget in estimated tokens
    pub max_context_tokens: usize,
    /// Minimum similarity for a chunk to be considered relevant
    pub min_similarity: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            overfetch_factor: 2,
            max_context_tokens: 2048,
            min_similarity: 0.3,
        }
    }
}

/// Prompt assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Persona instructions placed at the top of every prompt
    pub persona: String,
    /// Maximum prior conversation turns kept in the prompt
    pub max_history_turns: usize,
    /// Token budget for the history window
    pub max_history_tokens: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            persona: "You are a knowledgeable assistant. Answer using only the provided \
                      context and cite the chunk ids you used in square brackets."
                .to_string(),
            max_history_turns: 8,
            max_history_tokens: 1024,
        }
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Snapshot file path; `None` keeps the index memory-only
    pub snapshot_path: Option<PathBuf>,
}
