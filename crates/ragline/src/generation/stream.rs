//! Streaming answer handle with cooperative cancellation

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::{Error, Result};
use crate::types::AnswerOutcome;

/// Requests cancellation of an in-flight answer.
///
/// Cancellation is cooperative: the generation driver observes the flag
/// between fragments, so the stream settles within one token interval.
/// Cancelling an already-finished answer is a no-op.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub(crate) fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, rx)
    }

    /// Signal cancellation
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Incremental answer fragments plus a final [`AnswerOutcome`].
///
/// Yields each text fragment as the backend produces it. An `Err` item
/// reports abnormal termination; fragments already yielded remain valid
/// partial output. After the fragments end, [`AnswerStream::outcome`]
/// resolves to the aggregate result.
pub struct AnswerStream {
    query_id: u64,
    fragments: mpsc::Receiver<Result<String>>,
    cancel: CancelHandle,
    outcome: oneshot::Receiver<AnswerOutcome>,
}

impl AnswerStream {
    pub(crate) fn new(
        query_id: u64,
        fragments: mpsc::Receiver<Result<String>>,
        cancel: CancelHandle,
        outcome: oneshot::Receiver<AnswerOutcome>,
    ) -> Self {
        Self {
            query_id,
            fragments,
            cancel,
            outcome,
        }
    }

    /// Identifier of the query this stream answers, usable for state
    /// lookups on the pipeline
    pub fn query_id(&self) -> u64 {
        self.query_id
    }

    /// Handle for cancelling this answer from another task
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Request cancellation of this answer
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Next fragment, or `None` once generation has settled
    pub async fn next_fragment(&mut self) -> Option<Result<String>> {
        self.fragments.recv().await
    }

    /// Drain remaining fragments and return the final outcome
    pub async fn outcome(mut self) -> Result<AnswerOutcome> {
        while self.fragments.recv().await.is_some() {}
        self.outcome
            .await
            .map_err(|_| Error::internal("generation driver dropped without an outcome"))
    }
}

impl Stream for AnswerStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.fragments.poll_recv(cx)
    }
}
