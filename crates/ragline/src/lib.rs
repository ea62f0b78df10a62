//! Retrieval-augmented generation engine.
//!
//! Ingests documents (chunk, embed, index), retrieves the best-matching
//! chunks for a query under a token budget, and streams grounded answers
//! from a language-model backend with citations back to the source
//! chunks.
//!
//! # Quick start
//!
//! ```no_run
//! use ragline::{RagConfig, RagPipeline, DocumentMetadata};
//! use futures_util::StreamExt;
//!
//! # async fn run() -> ragline::Result<()> {
//! let pipeline = RagPipeline::with_ollama(RagConfig::default())?;
//!
//! pipeline
//!     .ingest("notes", "The sky is blue. Grass is green.", DocumentMetadata::default())
//!     .await?;
//!
//! let mut stream = pipeline.answer("what color is grass", &[]).await?;
//! while let Some(fragment) = stream.next().await {
//!     print!("{}", fragment?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod retrieval;
pub mod types;

#[cfg(test)]
pub(crate) mod test_util;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use generation::{AnswerStream, CancelHandle, PromptBuilder};
pub use pipeline::{DocumentState, IngestStage, QueryState, RagPipeline};
pub use providers::{EmbeddingProvider, LlmProvider, VectorStoreProvider};
pub use retrieval::{Reranker, Retriever, SimilarityOrder};
pub use types::{
    AnswerOutcome, AnswerStatus, Chunk, Citation, ConversationTurn, Document, DocumentMetadata,
    IndexStats, IngestReport, Role, ScoredChunk,
};

pub use ragline_core;
