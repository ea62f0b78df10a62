//! Similarity retrieval over the vector store

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::ingestion::normalize_query;
use crate::providers::{EmbeddingProvider, VectorStoreProvider};
use crate::types::ScoredChunk;

/// Reorders retrieved candidates before truncation to `top_k`.
///
/// The default [`SimilarityOrder`] keeps the store's similarity ranking;
/// a cross-encoder or recency reranker can slot in behind the same trait.
pub trait Reranker: Send + Sync {
    /// Reorder candidates in place
    fn rerank(&self, query: &str, candidates: &mut Vec<ScoredChunk>);

    /// Reranker name for logging
    fn name(&self) -> &str;
}

/// Passthrough reranker keeping similarity order
pub struct SimilarityOrder;

impl Reranker for SimilarityOrder {
    fn rerank(&self, _query: &str, _candidates: &mut Vec<ScoredChunk>) {}

    fn name(&self) -> &str {
        "similarity-order"
    }
}

/// Embeds queries and selects context chunks under a token budget
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStoreProvider>,
    reranker: Box<dyn Reranker>,
    config: RetrievalConfig,
}

impl Retriever {
    /// Create a retriever with the default similarity ordering
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStoreProvider>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            reranker: Box::new(SimilarityOrder),
            config,
        }
    }

    /// Replace the reranker
    pub fn with_reranker(mut self, reranker: Box<dyn Reranker>) -> Self {
        self.reranker = reranker;
        self
    }

    /// Retrieve the best-matching chunks for a query.
    ///
    /// An empty store yields an empty result rather than an error. The
    /// candidate pool is overfetched, filtered by the similarity floor,
    /// reranked, cut to `top_k`, then packed greedily under
    /// `max_context_tokens`; a chunk that would overflow the budget is
    /// skipped whole, never truncated.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        self.retrieve_filtered(query, &[]).await
    }

    /// Retrieve, excluding chunks from the named documents
    pub async fn retrieve_filtered(
        &self,
        query: &str,
        excluded_documents: &[String],
    ) -> Result<Vec<ScoredChunk>> {
        let query = normalize_query(query);
        if query.is_empty() {
            return Err(Error::config("query must not be empty"));
        }
        if self.store.is_empty().await? {
            tracing::debug!("store is empty, skipping retrieval");
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(&query).await?;
        let candidate_k = self.config.top_k.saturating_mul(self.config.overfetch_factor);
        let mut candidates = self
            .store
            .query(&query_vector, candidate_k.max(1), self.embedder.model_id())
            .await?;

        candidates.retain(|c| {
            c.similarity >= self.config.min_similarity
                && !excluded_documents.contains(&c.chunk.document_id)
        });

        self.reranker.rerank(&query, &mut candidates);
        candidates.truncate(self.config.top_k);

        let selected = self.pack_budget(candidates);
        tracing::debug!(
            selected = selected.len(),
            budget = self.config.max_context_tokens,
            "retrieval complete"
        );
        Ok(selected)
    }

    fn pack_budget(&self, candidates: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        let mut selected = Vec::with_capacity(candidates.len());
        let mut used = 0usize;
        for candidate in candidates {
            let cost = candidate.chunk.estimated_tokens();
            if used.saturating_add(cost) > self.config.max_context_tokens {
                tracing::debug!(
                    chunk_id = %candidate.chunk.id,
                    cost,
                    used,
                    "skipping chunk over token budget"
                );
                continue;
            }
            used += cost;
            selected.push(candidate);
        }
        selected
    }
}
