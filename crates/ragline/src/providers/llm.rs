//! Generation backend trait

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::Result;

/// A finite, lazy stream of response-text fragments.
///
/// Not restartable: regeneration requires a fresh `generate_stream` call.
/// Dropping the stream releases the backend connection, so cancellation
/// is simply ceasing to poll and dropping.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Streams tokens from a language-model backend for an assembled prompt
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Open a token stream for the prompt.
    ///
    /// Fails with `BackendUnavailable` when the backend is unreachable at
    /// stream start. An `Err` item mid-stream signals abnormal
    /// termination; fragments already yielded remain valid partial output.
    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream>;

    /// Whether the backend is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model in use
    fn model(&self) -> &str;
}
