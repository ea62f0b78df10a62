//! Local vector store backed by the in-process ragline-core index

use std::sync::Arc;

use async_trait::async_trait;
use ragline_core::{IndexEntry, IndexOptions, VectorIndex};

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::types::{Chunk, ScoredChunk};

use super::vector_store::VectorStoreProvider;

/// In-process vector store wrapping [`VectorIndex`].
///
/// Index calls are synchronous; they are offloaded through
/// `spawn_blocking` so a large scan never stalls the async runtime.
pub struct LocalVectorStore {
    index: Arc<VectorIndex>,
}

impl LocalVectorStore {
    /// Wrap an already-opened index
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self { index }
    }

    /// Open an index from engine configuration
    pub fn from_config(config: &RagConfig, model_id: &str) -> Result<Self> {
        let options = IndexOptions {
            dimensions: config.embedding.dimensions,
            metric: ragline_core::Metric::Cosine,
            model_id: model_id.to_string(),
            snapshot_path: config.index.snapshot_path.clone(),
        };
        let index = Arc::new(VectorIndex::open_with(options)?);
        Ok(Self { index })
    }

    /// Underlying index for direct access
    pub fn inner(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<VectorIndex>) -> Result<T> + Send + 'static,
    {
        let index = Arc::clone(&self.index);
        tokio::task::spawn_blocking(move || op(index))
            .await
            .map_err(|e| Error::internal(format!("task join error: {}", e)))?
    }
}

#[async_trait]
impl VectorStoreProvider for LocalVectorStore {
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()> {
        self.run_blocking(move |index| Ok(index.upsert(entries)?))
            .await
    }

    async fn query(&self, vector: &[f32], k: usize, model_id: &str) -> Result<Vec<ScoredChunk>> {
        let vector = vector.to_vec();
        let model_id = model_id.to_string();
        self.run_blocking(move |index| {
            let hits = index.query(&vector, k, &model_id)?;
            let mut results = Vec::with_capacity(hits.len());
            for hit in hits {
                let Some(metadata) = index.get_metadata(&hit.chunk_id)? else {
                    // Entry deleted between query and metadata fetch.
                    continue;
                };
                let chunk = Chunk::from_index_metadata(&hit.chunk_id, &metadata)?;
                results.push(ScoredChunk {
                    chunk,
                    similarity: hit.score,
                });
            }
            Ok(results)
        })
        .await
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let document_id = document_id.to_string();
        self.run_blocking(move |index| Ok(index.delete_document(&document_id)?))
            .await
    }

    async fn len(&self) -> Result<usize> {
        self.run_blocking(|index| Ok(index.len()?)).await
    }

    async fn document_count(&self) -> Result<usize> {
        self.run_blocking(|index| Ok(index.document_count()?)).await
    }

    async fn clear(&self) -> Result<()> {
        self.run_blocking(|index| Ok(index.clear()?)).await
    }

    async fn save(&self) -> Result<()> {
        self.run_blocking(|index| Ok(index.save()?)).await
    }

    async fn health_check(&self) -> Result<bool> {
        self.run_blocking(|index| Ok(index.len().is_ok())).await
    }

    fn name(&self) -> &str {
        "local-index"
    }
}
