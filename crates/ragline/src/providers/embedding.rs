//! Embedding provider trait

use async_trait::async_trait;

use crate::error::Result;

/// Maps text to fixed-dimension vectors.
///
/// Batched and order-preserving: `embed_batch` output index `i`
/// corresponds to input index `i`. Deterministic for a fixed model
/// version and input. An empty input string yields a zero vector rather
/// than an error so callers can index empty segments harmlessly.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, order-preserving
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| crate::error::Error::embedding("backend returned no vector"))
    }

    /// Identifier/version of the active model, used to tag stored vectors
    fn model_id(&self) -> &str;

    /// Embedding dimensionality
    fn dimensions(&self) -> usize;

    /// Whether the backend is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
