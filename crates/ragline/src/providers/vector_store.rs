//! Vector store provider trait

use async_trait::async_trait;
use ragline_core::IndexEntry;

use crate::error::Result;
use crate::types::ScoredChunk;

/// Stores chunk vectors and answers similarity queries.
///
/// Implementations:
/// - [`super::LocalVectorStore`]: in-process `ragline-core` index
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    /// Insert or replace entries, idempotent by chunk id
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()>;

    /// k-nearest-neighbor query; results carry the reconstructed chunks,
    /// ordered by descending similarity with chunk-id tie-breaking
    async fn query(&self, vector: &[f32], k: usize, model_id: &str) -> Result<Vec<ScoredChunk>>;

    /// Remove every entry of a document; idempotent, returns removed count
    async fn delete_document(&self, document_id: &str) -> Result<usize>;

    /// Total entries stored
    async fn len(&self) -> Result<usize>;

    /// Whether the store holds no entries
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Distinct documents with entries
    async fn document_count(&self) -> Result<usize>;

    /// Remove every entry
    async fn clear(&self) -> Result<()>;

    /// Persist the store, if it is backed by a snapshot
    async fn save(&self) -> Result<()>;

    /// Whether the store is usable
    async fn health_check(&self) -> Result<bool>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
