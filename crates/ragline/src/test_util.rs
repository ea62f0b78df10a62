//! Deterministic in-process providers for tests

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::providers::{EmbeddingProvider, LlmProvider, TokenStream};

/// Bag-of-words embedder: each word hashes into one of 64 buckets and
/// the vector is L2-normalized. Deterministic, and texts sharing words
/// score higher, which is all retrieval tests need.
pub struct StubEmbedder {
    model: String,
    dimensions: usize,
    fail: AtomicBool,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self::with_model("stub-embed-v1")
    }

    pub fn with_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
            dimensions: 64,
            fail: AtomicBool::new(false),
        }
    }

    /// Make subsequent embed calls fail as if the backend were down
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Synchronous embedding, usable from non-async test setup
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            vector[(hasher.finish() as usize) % self.dimensions] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for StubEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::backend_unavailable("embedding", "stub set to fail"));
        }
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.fail.load(Ordering::SeqCst))
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Streams the prompt back in fixed-size fragments, so tests can assert
/// on exactly what the assembler produced
pub struct EchoLlm;

#[async_trait]
impl LlmProvider for EchoLlm {
    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream> {
        let fragments: Vec<Result<String>> = prompt
            .chars()
            .collect::<Vec<_>>()
            .chunks(16)
            .map(|c| Ok(c.iter().collect::<String>()))
            .collect();
        Ok(Box::pin(futures_util::stream::iter(fragments)))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "echo"
    }

    fn model(&self) -> &str {
        "echo-v0"
    }
}

/// Emits a fixed fragment script with a configurable delay per fragment.
///
/// Counts opened and closed streams so cancellation tests can assert no
/// stream outlives its answer. `fail_after` injects a mid-stream error,
/// `unavailable` refuses to open a stream at all.
pub struct ScriptedLlm {
    pub fragments: Vec<String>,
    pub delay: Duration,
    pub fail_after: Option<usize>,
    pub unavailable: bool,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedLlm {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            delay: Duration::from_millis(0),
            fail_after: None,
            unavailable: false,
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_after(mut self, fragments: usize) -> Self {
        self.fail_after = Some(fragments);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn streams_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn streams_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

struct StreamGuard(Arc<AtomicUsize>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate_stream(&self, _prompt: &str) -> Result<TokenStream> {
        if self.unavailable {
            return Err(Error::backend_unavailable("llm", "scripted as down"));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let guard = StreamGuard(Arc::clone(&self.closed));
        let fragments = self.fragments.clone();
        let delay = self.delay;
        let fail_after = self.fail_after;

        let stream = futures_util::stream::unfold(
            (0usize, guard),
            move |(i, guard)| {
                let fragments = fragments.clone();
                async move {
                    if fail_after == Some(i) {
                        return Some((
                            Err(Error::generation("scripted stream failure", "")),
                            (i + 1, guard),
                        ));
                    }
                    if fail_after.map_or(false, |n| i > n) || i >= fragments.len() {
                        return None;
                    }
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Some((Ok(fragments[i].clone()), (i + 1, guard)))
                }
            },
        );
        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(!self.unavailable)
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-v0"
    }
}
