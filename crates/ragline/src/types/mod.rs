//! Core types for the RAG engine

pub mod conversation;
pub mod document;
pub mod response;

pub use conversation::{ConversationTurn, Role};
pub use document::{Chunk, Document, DocumentMetadata};
pub use response::{AnswerOutcome, AnswerStatus, Citation, IndexStats, IngestReport, ScoredChunk};

/// Estimated token count of a text, `ceil(chars / 4)`.
///
/// Deterministic and cheap; good enough for context-window budgeting
/// without pulling in a tokenizer.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
