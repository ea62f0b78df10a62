//! Ollama-style HTTP backend for embeddings and streaming generation

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;
use super::llm::{LlmProvider, TokenStream};

/// Shared HTTP client for an Ollama-style backend.
///
/// No retry logic lives here: transient failures surface as
/// `BackendUnavailable` immediately and retry policy belongs to the
/// caller.
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

/// One NDJSON line of a streaming generate response
#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

impl OllamaClient {
    /// Create a client for the given backend
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Whether the backend answers at all
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Request a single embedding
    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbedRequest {
            model: model.to_string(),
            prompt: text.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::backend_unavailable("embedding", e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::embedding(format!("HTTP {}: {}", status, body)));
        }
        if !status.is_success() {
            return Err(Error::backend_unavailable(
                "embedding",
                format!("HTTP {}", status),
            ));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("malformed embedding response: {}", e)))?;
        Ok(embed_response.embedding)
    }

    /// Open a streaming generate request
    pub async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<TokenStream> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: true,
            options: GenerateOptions { temperature },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::backend_unavailable("llm", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::backend_unavailable(
                "llm",
                format!("HTTP {}: {}", status, body),
            ));
        }

        Ok(Box::pin(NdjsonTokenStream::new(Box::pin(
            response.bytes_stream(),
        ))))
    }
}

/// Parses an NDJSON byte stream into text fragments.
///
/// Lines may be split across network chunks, so bytes are buffered until
/// a full line arrives. The stream ends cleanly only after the backend's
/// `done` marker; an EOF before it is an abnormal termination.
struct NdjsonTokenStream {
    inner: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: String,
    pending: VecDeque<String>,
    saw_done: bool,
    finished: bool,
}

impl NdjsonTokenStream {
    fn new(inner: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>) -> Self {
        Self {
            inner,
            buffer: String::new(),
            pending: VecDeque::new(),
            saw_done: false,
            finished: false,
        }
    }

    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            self.parse_line(line.trim());
        }
    }

    fn parse_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<StreamChunk>(line) {
            Ok(chunk) => {
                if !chunk.response.is_empty() {
                    self.pending.push_back(chunk.response);
                }
                if chunk.done {
                    self.saw_done = true;
                }
            }
            Err(e) => {
                tracing::warn!("skipping unparseable stream line: {}", e);
            }
        }
    }
}

impl Stream for NdjsonTokenStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(fragment) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(fragment)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.push_str(&String::from_utf8_lossy(&bytes));
                    this.drain_lines();
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(Error::generation(
                        format!("stream error: {}", e),
                        String::new(),
                    ))));
                }
                Poll::Ready(None) => {
                    // Flush any trailing line without a newline.
                    if !this.buffer.is_empty() {
                        let tail = std::mem::take(&mut this.buffer);
                        this.parse_line(tail.trim());
                        continue;
                    }
                    this.finished = true;
                    if !this.saw_done && this.pending.is_empty() {
                        return Poll::Ready(Some(Err(Error::generation(
                            "stream ended before the backend's end marker",
                            String::new(),
                        ))));
                    }
                }
            }
        }
    }
}

/// Ollama embedding provider
pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    /// Create an embedder sharing the given client
    pub fn new(client: Arc<OllamaClient>, config: &EmbeddingConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            dimensions: config.dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // The API takes one prompt per call; order is preserved by
        // awaiting sequentially.
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            if text.trim().is_empty() {
                vectors.push(vec![0.0; self.dimensions]);
                continue;
            }
            let vector = self.client.embed(&self.model, text).await?;
            if vector.len() != self.dimensions {
                return Err(Error::embedding(format!(
                    "backend returned {} dimensions, expected {}",
                    vector.len(),
                    self.dimensions
                )));
            }
            vectors.push(vector);
        }
        Ok(vectors)
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Ollama generation provider
pub struct OllamaLlm {
    client: Arc<OllamaClient>,
    model: String,
    temperature: f32,
}

impl OllamaLlm {
    /// Create a generation provider sharing the given client
    pub fn new(client: Arc<OllamaClient>, config: &LlmConfig) -> Self {
        Self {
            client,
            model: config.generate_model.clone(),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaLlm {
    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream> {
        tracing::info!(model = %self.model, "opening generation stream");
        self.client
            .generate_stream(&self.model, prompt, self.temperature)
            .await
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
