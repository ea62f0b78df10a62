//! Document ingestion: text normalization and chunking

pub mod chunker;

pub use chunker::TextChunker;

/// Normalize raw document text before chunking: unify line endings and
/// strip trailing whitespace. Deliberately mild so chunk offsets stay
/// meaningful against what was actually indexed.
pub fn normalize_document_text(text: &str) -> String {
    text.replace("\r\n", "\n").trim_end().to_string()
}

/// Normalize a user query before embedding: trim and collapse runs of
/// whitespace to single spaces.
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
