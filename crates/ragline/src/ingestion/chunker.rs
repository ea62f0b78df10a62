//! Text chunking with overlap and offset tracking
//!
//! Splits on sentence boundaries when one falls inside the size window,
//! hard-slicing only when a single sentence exceeds the maximum chunk
//! size. Chunks fully cover the source text with no gaps, and consecutive
//! chunks share exactly `overlap_size` characters except where a short
//! sentence-bounded chunk makes that impossible.

use std::collections::BTreeSet;

use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::types::Chunk;

/// Text chunker with a fixed size/overlap policy
pub struct TextChunker {
    max_chunk_size: usize,
    overlap_size: usize,
}

impl TextChunker {
    /// Create a chunker, validating `0 <= overlap_size < max_chunk_size`
    pub fn new(max_chunk_size: usize, overlap_size: usize) -> Result<Self> {
        ChunkingConfig {
            max_chunk_size,
            overlap_size,
        }
        .validate()?;
        Ok(Self {
            max_chunk_size,
            overlap_size,
        })
    }

    /// Create a chunker from a validated config
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.max_chunk_size, config.overlap_size)
    }

    /// Split a document's text into ordered chunks.
    ///
    /// Offsets are in characters. Ordinals are stable and
    /// order-preserving; an empty text yields no chunks.
    pub fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        if total == 0 {
            return Vec::new();
        }

        let sentence_ends = self.sentence_end_offsets(text);

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut prev_end = 0usize;
        let mut ordinal = 0u32;

        loop {
            let hard_end = (start + self.max_chunk_size).min(total);
            let end = if hard_end < total {
                // Furthest sentence end inside the window, else hard slice.
                sentence_ends
                    .range(start + 1..=hard_end)
                    .next_back()
                    .copied()
                    .unwrap_or(hard_end)
            } else {
                total
            };

            let overlap = if ordinal == 0 { 0 } else { prev_end - start };
            let span: String = chars[start..end].iter().collect();
            chunks.push(Chunk::new(document_id, span, start, end, overlap, ordinal));
            ordinal += 1;

            if end >= total {
                break;
            }
            prev_end = end;
            // A chunk shorter than the overlap cannot donate one; skip the
            // overlap for that boundary rather than re-emitting the chunk.
            start = if end - start > self.overlap_size {
                end - self.overlap_size
            } else {
                end
            };
        }

        tracing::debug!(
            document_id,
            chunks = chunks.len(),
            chars = total,
            "chunked document"
        );
        chunks
    }

    /// Character offsets at which a sentence ends
    fn sentence_end_offsets(&self, text: &str) -> BTreeSet<usize> {
        let mut ends = BTreeSet::new();
        let mut offset = 0usize;
        for sentence in text.split_sentence_bounds() {
            offset += sentence.chars().count();
            ends.insert(offset);
        }
        ends
    }
}
