//! Pipeline coordinator wiring chunking, embedding, indexing, retrieval,
//! and generation into the two top-level flows: ingest and answer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::config::{RagConfig, RetrievalConfig};
use crate::error::{Error, Result};
use crate::generation::{cited_ids, extract_citations, post_process_answer};
use crate::generation::{AnswerStream, CancelHandle, PromptBuilder};
use crate::ingestion::{normalize_document_text, normalize_query, TextChunker};
use crate::providers::{
    EmbeddingProvider, LlmProvider, LocalVectorStore, OllamaClient, OllamaEmbedder, OllamaLlm,
    VectorStoreProvider,
};
use crate::retrieval::Retriever;
use crate::types::{
    AnswerOutcome, AnswerStatus, Chunk, Citation, ConversationTurn, Document, DocumentMetadata,
    IndexStats, IngestReport, ScoredChunk,
};
use ragline_core::IndexEntry;

/// Ingestion stage a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Chunking,
    Embedding,
    Indexing,
}

/// Lifecycle state of a document in the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentState {
    /// Being split into chunks
    Chunking,
    /// Chunks are being embedded
    Embedding,
    /// Vectors are being written to the index
    Indexing,
    /// Fully indexed and retrievable
    Indexed,
    /// Ingestion failed; no partial entries remain in the index
    Failed { stage: IngestStage, error: String },
}

/// Lifecycle state of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryState {
    Received,
    Retrieving,
    Assembling,
    Generating,
    Completed,
    Cancelled,
    Failed,
}

impl QueryState {
    /// Whether the query reached a terminal state
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            QueryState::Completed | QueryState::Cancelled | QueryState::Failed
        )
    }
}

/// Settled query states older than this many queries are evicted, so the
/// state map stays bounded on a long-running host.
const SETTLED_QUERY_RETENTION: u64 = 256;

/// The engine facade.
///
/// One instance owns the providers and the index and serves concurrent
/// ingests and queries. Ingests of the same document id are serialized;
/// everything else runs in parallel against the linearizable index.
pub struct RagPipeline {
    config: RagConfig,
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    store: Arc<dyn VectorStoreProvider>,
    retriever: Retriever,
    prompt_builder: PromptBuilder,
    documents: DashMap<String, Document>,
    document_states: DashMap<String, DocumentState>,
    ingest_locks: DashMap<String, Arc<Mutex<()>>>,
    query_states: Arc<DashMap<u64, QueryState>>,
    next_query_id: AtomicU64,
}

impl RagPipeline {
    /// Build a pipeline from explicit providers
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn VectorStoreProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let chunker = TextChunker::from_config(&config.chunking)?;
        let retriever = Retriever::new(
            Arc::clone(&embedder),
            Arc::clone(&store),
            config.retrieval.clone(),
        );
        let prompt_builder = PromptBuilder::new(config.prompt.clone());

        Ok(Self {
            config,
            chunker,
            embedder,
            llm,
            store,
            retriever,
            prompt_builder,
            documents: DashMap::new(),
            document_states: DashMap::new(),
            ingest_locks: DashMap::new(),
            query_states: Arc::new(DashMap::new()),
            next_query_id: AtomicU64::new(1),
        })
    }

    /// Build a pipeline against an Ollama-style backend with the local
    /// in-process index
    pub fn with_ollama(config: RagConfig) -> Result<Self> {
        let client = Arc::new(OllamaClient::new(
            &config.llm.base_url,
            config.llm.timeout_secs,
        )?);
        let embedder = Arc::new(OllamaEmbedder::new(Arc::clone(&client), &config.embedding));
        let llm = Arc::new(OllamaLlm::new(client, &config.llm));
        let store = Arc::new(LocalVectorStore::from_config(&config, embedder.model_id())?);
        Self::new(config, embedder, llm, store)
    }

    /// Engine configuration
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Ingest a document: chunk, embed, and index its text.
    ///
    /// Re-ingesting an id supersedes all prior chunks of that document.
    /// Unchanged text (same content hash) is skipped. Concurrent ingests
    /// of the same id are serialized; a failure after partial index
    /// writes rolls those writes back, so the document is either fully
    /// indexed or absent.
    pub async fn ingest(
        &self,
        document_id: &str,
        text: &str,
        metadata: DocumentMetadata,
    ) -> Result<IngestReport> {
        if document_id.trim().is_empty() {
            return Err(Error::config("document_id must not be empty"));
        }
        if document_id.contains('#') {
            return Err(Error::config("document_id must not contain '#'"));
        }

        self.prune_ingest_locks();
        let lock = self
            .ingest_locks
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let text = normalize_document_text(text);
        let mut document = Document::new(document_id, &text, metadata);

        if let Some(existing) = self.documents.get(document_id) {
            if existing.content_hash == document.content_hash {
                tracing::debug!(document_id, "content unchanged, skipping ingest");
                return Ok(IngestReport {
                    document_id: document_id.to_string(),
                    chunks_indexed: existing.total_chunks as usize,
                    skipped_unchanged: true,
                    superseded_chunks: 0,
                });
            }
        }

        // Prior entries go first so a changed document is never half old,
        // half new.
        let superseded = self.store.delete_document(document_id).await?;

        self.document_states
            .insert(document_id.to_string(), DocumentState::Chunking);
        let chunks = self.chunker.chunk(document_id, &text);
        if chunks.is_empty() {
            tracing::info!(document_id, superseded, "empty document, nothing to index");
            self.documents.remove(document_id);
            self.document_states
                .insert(document_id.to_string(), DocumentState::Indexed);
            self.store.save().await?;
            return Ok(IngestReport {
                document_id: document_id.to_string(),
                chunks_indexed: 0,
                skipped_unchanged: false,
                superseded_chunks: superseded,
            });
        }

        self.document_states
            .insert(document_id.to_string(), DocumentState::Embedding);
        let vectors = match self.embed_chunks(&chunks).await {
            Ok(vectors) => vectors,
            Err(e) => {
                self.mark_failed(document_id, IngestStage::Embedding, &e);
                return Err(e);
            }
        };

        self.document_states
            .insert(document_id.to_string(), DocumentState::Indexing);
        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry {
                chunk_id: chunk.id.clone(),
                document_id: chunk.document_id.clone(),
                vector,
                model_id: self.embedder.model_id().to_string(),
                metadata: chunk.to_index_metadata(),
            })
            .collect();

        if let Err(e) = self.store.upsert(entries).await {
            // Roll back so no partial version of the document survives.
            let _ = self.store.delete_document(document_id).await;
            self.mark_failed(document_id, IngestStage::Indexing, &e);
            return Err(e);
        }

        document.total_chunks = chunks.len() as u32;
        self.documents
            .insert(document_id.to_string(), document);
        self.document_states
            .insert(document_id.to_string(), DocumentState::Indexed);
        self.store.save().await?;

        tracing::info!(
            document_id,
            chunks = chunks.len(),
            superseded,
            "document indexed"
        );
        Ok(IngestReport {
            document_id: document_id.to_string(),
            chunks_indexed: chunks.len(),
            skipped_unchanged: false,
            superseded_chunks: superseded,
        })
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.embedding.batch_size.max(1)) {
            vectors.extend(self.embedder.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    fn mark_failed(&self, document_id: &str, stage: IngestStage, error: &Error) {
        tracing::warn!(document_id, ?stage, %error, "ingest failed");
        self.document_states.insert(
            document_id.to_string(),
            DocumentState::Failed {
                stage,
                error: error.to_string(),
            },
        );
    }

    /// Drop lock entries no in-flight ingest holds; entries held elsewhere
    /// have a strong count above the map's own reference
    fn prune_ingest_locks(&self) {
        self.ingest_locks
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Remove a document and all its index entries; idempotent
    pub async fn remove_document(&self, document_id: &str) -> Result<usize> {
        self.prune_ingest_locks();
        let lock = self
            .ingest_locks
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let removed = self.store.delete_document(document_id).await?;
        self.documents.remove(document_id);
        self.document_states.remove(document_id);
        self.store.save().await?;
        tracing::info!(document_id, removed, "document removed");
        Ok(removed)
    }

    /// Answer a query with retrieval-grounded streaming generation.
    ///
    /// Retrieval and prompt assembly happen before this returns; errors
    /// there (including an unreachable generation backend) surface as
    /// `Err`. The returned stream yields fragments as the backend
    /// produces them and settles with an [`AnswerOutcome`]. Cancelling
    /// through the stream's handle takes effect within one fragment.
    pub async fn answer(
        &self,
        query: &str,
        history: &[ConversationTurn],
    ) -> Result<AnswerStream> {
        let query_id = self.next_query_id.fetch_add(1, Ordering::Relaxed);
        self.query_states.insert(query_id, QueryState::Received);

        let query = normalize_query(query);
        if query.is_empty() {
            self.query_states.insert(query_id, QueryState::Failed);
            return Err(Error::config("query must not be empty"));
        }

        self.query_states.insert(query_id, QueryState::Retrieving);
        let retrieved = match self.retriever.retrieve(&query).await {
            Ok(retrieved) => retrieved,
            Err(e) => {
                self.query_states.insert(query_id, QueryState::Failed);
                return Err(e);
            }
        };

        self.query_states.insert(query_id, QueryState::Assembling);
        let prompt = self.prompt_builder.assemble(history, &retrieved, &query);

        self.query_states.insert(query_id, QueryState::Generating);
        let token_stream = match self.llm.generate_stream(&prompt).await {
            Ok(stream) => stream,
            Err(e) => {
                self.query_states.insert(query_id, QueryState::Failed);
                return Err(e);
            }
        };

        let (frag_tx, frag_rx) = mpsc::channel(32);
        let (cancel, cancel_rx) = CancelHandle::new();
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let driver = AnswerDriver {
            query_id,
            query: query.clone(),
            retrieved,
            query_states: Arc::clone(&self.query_states),
        };
        tokio::spawn(driver.run(token_stream, cancel_rx, frag_tx, outcome_tx));

        Ok(AnswerStream::new(query_id, frag_rx, cancel, outcome_rx))
    }

    /// Similarity search without generation
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        if top_k == 0 {
            return Err(Error::config("top_k must be >= 1"));
        }
        let config = RetrievalConfig {
            top_k,
            overfetch_factor: 1,
            max_context_tokens: usize::MAX,
            min_similarity: 0.0,
        };
        Retriever::new(Arc::clone(&self.embedder), Arc::clone(&self.store), config)
            .retrieve(query)
            .await
    }

    /// Knowledge-base snapshot
    pub async fn stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            documents: self.store.document_count().await?,
            chunks: self.store.len().await?,
            embedding_model: self.embedder.model_id().to_string(),
        })
    }

    /// Drop every document and index entry, along with settled query
    /// states and idle ingest locks
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await?;
        self.documents.clear();
        self.document_states.clear();
        self.query_states.retain(|_, state| !state.is_settled());
        self.prune_ingest_locks();
        self.store.save().await?;
        Ok(())
    }

    /// Record of an ingested document, if present
    pub fn document(&self, document_id: &str) -> Option<Document> {
        self.documents.get(document_id).map(|d| d.clone())
    }

    /// Current lifecycle state of a document
    pub fn document_state(&self, document_id: &str) -> Option<DocumentState> {
        self.document_states.get(document_id).map(|s| s.clone())
    }

    /// Current lifecycle state of a query
    pub fn query_state(&self, query_id: u64) -> Option<QueryState> {
        self.query_states.get(&query_id).map(|s| s.clone())
    }

    /// Whether all backends are reachable
    pub async fn health_check(&self) -> Result<bool> {
        Ok(self.embedder.health_check().await?
            && self.llm.health_check().await?
            && self.store.health_check().await?)
    }
}

/// Drives one generation stream to its outcome on a spawned task
struct AnswerDriver {
    query_id: u64,
    query: String,
    retrieved: Vec<ScoredChunk>,
    query_states: Arc<DashMap<u64, QueryState>>,
}

impl AnswerDriver {
    async fn run(
        self,
        mut token_stream: crate::providers::TokenStream,
        mut cancel_rx: tokio::sync::watch::Receiver<bool>,
        frag_tx: mpsc::Sender<Result<String>>,
        outcome_tx: oneshot::Sender<AnswerOutcome>,
    ) {
        let mut partial = String::new();
        let mut cancel_gone = false;

        let status = loop {
            tokio::select! {
                biased;
                // The watch guard is !Send; map it away inside the branch
                // so the spawned future stays Send.
                changed = async { cancel_rx.wait_for(|cancelled| *cancelled).await.map(|_| ()) },
                    if !cancel_gone =>
                {
                    match changed {
                        Ok(()) => break AnswerStatus::Cancelled,
                        Err(_) => cancel_gone = true,
                    }
                }
                item = token_stream.next() => match item {
                    Some(Ok(fragment)) => {
                        partial.push_str(&fragment);
                        if frag_tx.send(Ok(fragment)).await.is_err() {
                            // Receiver dropped: nobody is listening.
                            break AnswerStatus::Cancelled;
                        }
                    }
                    Some(Err(e)) => {
                        let message = e.to_string();
                        let _ = frag_tx
                            .send(Err(Error::generation(message.clone(), partial.clone())))
                            .await;
                        break AnswerStatus::Failed { message };
                    }
                    None => break AnswerStatus::Completed,
                }
            }
        };

        // Dropping the stream closes the backend connection.
        drop(token_stream);
        drop(frag_tx);

        let (answer, cited) = match &status {
            AnswerStatus::Completed => {
                let answer = post_process_answer(&partial);
                let cited = extract_citations(&answer, &self.retrieved);
                (answer, cited)
            }
            // Partial output keeps only citations it already contains.
            _ => (partial.clone(), cited_ids(&partial, &self.retrieved)),
        };

        let citations: Vec<Citation> = cited
            .iter()
            .filter_map(|id| {
                self.retrieved
                    .iter()
                    .find(|s| &s.chunk.id == id)
                    .map(Citation::from_scored)
            })
            .collect();

        let state = match &status {
            AnswerStatus::Completed => QueryState::Completed,
            AnswerStatus::Cancelled => QueryState::Cancelled,
            AnswerStatus::Failed { .. } => QueryState::Failed,
        };
        self.query_states.insert(self.query_id, state);
        let cutoff = self.query_id.saturating_sub(SETTLED_QUERY_RETENTION);
        self.query_states
            .retain(|id, state| *id >= cutoff || !state.is_settled());
        tracing::info!(query_id = self.query_id, status = ?status, "answer settled");

        let _ = outcome_tx.send(AnswerOutcome {
            query: self.query,
            answer,
            cited_chunk_ids: cited,
            citations,
            status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;
    use crate::test_util::{EchoLlm, ScriptedLlm, StubEmbedder};
    use ragline_core::{IndexOptions, VectorIndex};
    use std::time::Duration;

    fn build(
        config: RagConfig,
        llm: Arc<dyn LlmProvider>,
    ) -> (Arc<RagPipeline>, Arc<StubEmbedder>) {
        let embedder = Arc::new(StubEmbedder::new());
        let index = VectorIndex::open_with(IndexOptions::in_memory(
            embedder.dimensions(),
            embedder.model_id(),
        ))
        .unwrap();
        let store = Arc::new(LocalVectorStore::new(Arc::new(index)));
        let pipeline = RagPipeline::new(config, embedder.clone(), llm, store).unwrap();
        (Arc::new(pipeline), embedder)
    }

    fn small_chunk_config() -> RagConfig {
        RagConfig {
            chunking: ChunkingConfig {
                max_chunk_size: 20,
                overlap_size: 5,
            },
            ..RagConfig::default()
        }
    }

    #[tokio::test]
    async fn test_ingest_reports_chunk_count() {
        let (pipeline, _) = build(small_chunk_config(), Arc::new(EchoLlm));
        let report = pipeline
            .ingest(
                "notes",
                "The sky is blue. Grass is green.",
                DocumentMetadata::default(),
            )
            .await
            .unwrap();

        assert_eq!(report.document_id, "notes");
        assert_eq!(report.chunks_indexed, 2);
        assert!(!report.skipped_unchanged);
        assert_eq!(report.superseded_chunks, 0);
        assert_eq!(
            pipeline.document_state("notes"),
            Some(DocumentState::Indexed)
        );
        assert_eq!(pipeline.document("notes").unwrap().total_chunks, 2);
    }

    #[tokio::test]
    async fn test_search_finds_the_grass_chunk() {
        let (pipeline, _) = build(small_chunk_config(), Arc::new(EchoLlm));
        pipeline
            .ingest(
                "notes",
                "The sky is blue. Grass is green.",
                DocumentMetadata::default(),
            )
            .await
            .unwrap();

        let results = pipeline.search("what color is grass", 2).await.unwrap();
        assert!(!results.is_empty());
        assert!(results[0].chunk.text.contains("Grass is green."));
    }

    #[tokio::test]
    async fn test_answer_end_to_end_with_echo_backend() {
        let (pipeline, _) = build(small_chunk_config(), Arc::new(EchoLlm));
        pipeline
            .ingest(
                "notes",
                "The sky is blue. Grass is green.",
                DocumentMetadata::default(),
            )
            .await
            .unwrap();

        let stream = pipeline.answer("what color is grass", &[]).await.unwrap();
        let query_id = stream.query_id();
        let outcome = stream.outcome().await.unwrap();

        assert_eq!(outcome.status, AnswerStatus::Completed);
        // The echo backend returns the assembled prompt, so the answer
        // must contain the retrieved chunk and the framed question.
        assert!(outcome.answer.contains("Grass is green."));
        assert!(outcome.answer.contains("QUESTION: what color is grass"));
        assert!(outcome
            .cited_chunk_ids
            .iter()
            .any(|id| id.starts_with("notes#")));
        assert_eq!(pipeline.query_state(query_id), Some(QueryState::Completed));
    }

    #[tokio::test]
    async fn test_answer_streams_fragments_incrementally() {
        let llm = Arc::new(ScriptedLlm::new(&["Grass ", "is ", "green."]));
        let (pipeline, _) = build(RagConfig::default(), llm);
        pipeline
            .ingest("doc", "grass is green", DocumentMetadata::default())
            .await
            .unwrap();

        let mut stream = pipeline.answer("grass color", &[]).await.unwrap();
        let mut fragments = Vec::new();
        while let Some(fragment) = stream.next_fragment().await {
            fragments.push(fragment.unwrap());
        }
        assert_eq!(fragments, vec!["Grass ", "is ", "green."]);

        let outcome = stream.outcome().await.unwrap();
        assert_eq!(outcome.answer, "Grass is green.");
        assert_eq!(outcome.status, AnswerStatus::Completed);
    }

    #[tokio::test]
    async fn test_reingest_supersedes_prior_version() {
        let (pipeline, _) = build(small_chunk_config(), Arc::new(EchoLlm));
        pipeline
            .ingest(
                "notes",
                "The sky is blue. Grass is green.",
                DocumentMetadata::default(),
            )
            .await
            .unwrap();

        let report = pipeline
            .ingest("notes", "Snow is white.", DocumentMetadata::default())
            .await
            .unwrap();
        assert_eq!(report.superseded_chunks, 2);
        assert_eq!(report.chunks_indexed, 1);

        let stats = pipeline.stats().await.unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 1);

        let results = pipeline.search("snow white", 5).await.unwrap();
        assert!(results.iter().all(|r| !r.chunk.text.contains("Grass")));
    }

    #[tokio::test]
    async fn test_unchanged_reingest_is_skipped() {
        let (pipeline, _) = build(RagConfig::default(), Arc::new(EchoLlm));
        pipeline
            .ingest("doc", "stable text", DocumentMetadata::default())
            .await
            .unwrap();
        let report = pipeline
            .ingest("doc", "stable text", DocumentMetadata::default())
            .await
            .unwrap();
        assert!(report.skipped_unchanged);
        assert_eq!(report.superseded_chunks, 0);
    }

    #[tokio::test]
    async fn test_empty_document_clears_prior_entries() {
        let (pipeline, _) = build(RagConfig::default(), Arc::new(EchoLlm));
        pipeline
            .ingest("doc", "some text", DocumentMetadata::default())
            .await
            .unwrap();

        let report = pipeline
            .ingest("doc", "   ", DocumentMetadata::default())
            .await
            .unwrap();
        assert_eq!(report.chunks_indexed, 0);
        assert_eq!(report.superseded_chunks, 1);
        assert_eq!(pipeline.stats().await.unwrap().chunks, 0);
    }

    #[tokio::test]
    async fn test_ingest_failure_leaves_no_partial_entries() {
        let (pipeline, embedder) = build(RagConfig::default(), Arc::new(EchoLlm));
        embedder.set_failing(true);

        let err = pipeline
            .ingest("doc", "some text", DocumentMetadata::default())
            .await;
        assert!(matches!(err, Err(Error::BackendUnavailable { .. })));
        assert!(matches!(
            pipeline.document_state("doc"),
            Some(DocumentState::Failed {
                stage: IngestStage::Embedding,
                ..
            })
        ));
        assert_eq!(pipeline.stats().await.unwrap().chunks, 0);

        // Recovers once the backend is back.
        embedder.set_failing(false);
        pipeline
            .ingest("doc", "some text", DocumentMetadata::default())
            .await
            .unwrap();
        assert_eq!(
            pipeline.document_state("doc"),
            Some(DocumentState::Indexed)
        );
    }

    #[tokio::test]
    async fn test_remove_document_is_idempotent() {
        let (pipeline, _) = build(RagConfig::default(), Arc::new(EchoLlm));
        pipeline
            .ingest("doc", "some text", DocumentMetadata::default())
            .await
            .unwrap();

        assert_eq!(pipeline.remove_document("doc").await.unwrap(), 1);
        assert_eq!(pipeline.remove_document("doc").await.unwrap(), 0);
        assert!(pipeline.document("doc").is_none());
    }

    #[tokio::test]
    async fn test_invalid_document_ids_rejected() {
        let (pipeline, _) = build(RagConfig::default(), Arc::new(EchoLlm));
        let empty = pipeline
            .ingest("  ", "text", DocumentMetadata::default())
            .await;
        assert!(matches!(empty, Err(Error::Config(_))));
        let hash = pipeline
            .ingest("a#b", "text", DocumentMetadata::default())
            .await;
        assert!(matches!(hash, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let (pipeline, _) = build(RagConfig::default(), Arc::new(EchoLlm));
        let err = pipeline.answer("   ", &[]).await;
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_answer_on_empty_index_uses_placeholder_context() {
        let (pipeline, _) = build(RagConfig::default(), Arc::new(EchoLlm));
        let stream = pipeline.answer("anything", &[]).await.unwrap();
        let outcome = stream.outcome().await.unwrap();

        assert_eq!(outcome.status, AnswerStatus::Completed);
        assert!(outcome
            .answer
            .contains("No relevant information found in the knowledge base."));
        assert!(outcome.cited_chunk_ids.is_empty());
        assert!(outcome.citations.is_empty());
    }

    #[tokio::test]
    async fn test_backend_unavailable_surfaces_before_streaming() {
        let llm = Arc::new(ScriptedLlm::new(&["never"]).unavailable());
        let (pipeline, _) = build(RagConfig::default(), llm.clone());
        pipeline
            .ingest("doc", "grass is green", DocumentMetadata::default())
            .await
            .unwrap();

        let err = pipeline.answer("grass", &[]).await;
        assert!(matches!(err, Err(Error::BackendUnavailable { .. })));
        assert_eq!(llm.streams_opened(), 0);
    }

    #[tokio::test]
    async fn test_midstream_failure_preserves_partial_output() {
        let llm = Arc::new(ScriptedLlm::new(&["Grass ", "is "]).failing_after(2));
        let (pipeline, _) = build(RagConfig::default(), llm);
        pipeline
            .ingest("doc", "grass is green", DocumentMetadata::default())
            .await
            .unwrap();

        let mut stream = pipeline.answer("grass", &[]).await.unwrap();
        let query_id = stream.query_id();
        let mut saw_error = false;
        while let Some(fragment) = stream.next_fragment().await {
            match fragment {
                Ok(_) => {}
                Err(Error::Generation { partial, .. }) => {
                    assert_eq!(partial, "Grass is ");
                    saw_error = true;
                }
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert!(saw_error);

        let outcome = stream.outcome().await.unwrap();
        assert!(matches!(outcome.status, AnswerStatus::Failed { .. }));
        assert_eq!(outcome.answer, "Grass is ");
        assert_eq!(pipeline.query_state(query_id), Some(QueryState::Failed));
    }

    #[tokio::test]
    async fn test_cancellation_settles_promptly_without_leaking_streams() {
        let fragments: Vec<String> = (0..100).map(|i| format!("tok{} ", i)).collect();
        let fragment_refs: Vec<&str> = fragments.iter().map(|s| s.as_str()).collect();
        let llm = Arc::new(
            ScriptedLlm::new(&fragment_refs).with_delay(Duration::from_millis(20)),
        );
        let (pipeline, _) = build(RagConfig::default(), llm.clone());
        pipeline
            .ingest("doc", "grass is green", DocumentMetadata::default())
            .await
            .unwrap();

        let mut stream = pipeline.answer("grass", &[]).await.unwrap();
        let query_id = stream.query_id();
        let first = stream.next_fragment().await.unwrap().unwrap();
        assert_eq!(first, "tok0 ");

        stream.cancel();
        let outcome = stream.outcome().await.unwrap();

        assert_eq!(outcome.status, AnswerStatus::Cancelled);
        // Partial output is preserved, and nowhere near the full script.
        assert!(outcome.answer.starts_with("tok0 "));
        assert!(outcome.answer.len() < fragments.join("").len() / 2);
        assert_eq!(pipeline.query_state(query_id), Some(QueryState::Cancelled));
        // The backend stream was opened once and closed once.
        assert_eq!(llm.streams_opened(), 1);
        assert_eq!(llm.streams_closed(), 1);
    }

    #[tokio::test]
    async fn test_dropping_the_stream_closes_the_backend() {
        let fragments: Vec<String> = (0..100).map(|i| format!("tok{} ", i)).collect();
        let fragment_refs: Vec<&str> = fragments.iter().map(|s| s.as_str()).collect();
        let llm = Arc::new(
            ScriptedLlm::new(&fragment_refs).with_delay(Duration::from_millis(5)),
        );
        let (pipeline, _) = build(RagConfig::default(), llm.clone());
        pipeline
            .ingest("doc", "grass is green", DocumentMetadata::default())
            .await
            .unwrap();

        let stream = pipeline.answer("grass", &[]).await.unwrap();
        drop(stream);

        // The driver notices the dropped receiver on its next send.
        tokio::time::timeout(Duration::from_secs(5), async {
            while llm.streams_closed() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("backend stream was not released");
        assert_eq!(llm.streams_opened(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ingests_of_same_document_serialize() {
        let (pipeline, _) = build(RagConfig::default(), Arc::new(EchoLlm));

        let a = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                pipeline
                    .ingest("doc", "first version text", DocumentMetadata::default())
                    .await
            })
        };
        let b = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                pipeline
                    .ingest("doc", "second version text", DocumentMetadata::default())
                    .await
            })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // Exactly one complete version remains, never a mix.
        let stats = pipeline.stats().await.unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(
            stats.chunks,
            pipeline.document("doc").unwrap().total_chunks as usize
        );
    }

    #[tokio::test]
    async fn test_clear_empties_the_knowledge_base() {
        let (pipeline, _) = build(RagConfig::default(), Arc::new(EchoLlm));
        pipeline
            .ingest("a", "text one", DocumentMetadata::default())
            .await
            .unwrap();
        pipeline
            .ingest("b", "text two", DocumentMetadata::default())
            .await
            .unwrap();

        pipeline.clear().await.unwrap();
        let stats = pipeline.stats().await.unwrap();
        assert_eq!(stats.documents, 0);
        assert_eq!(stats.chunks, 0);
        assert!(pipeline.document("a").is_none());
    }

    #[tokio::test]
    async fn test_snapshot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RagConfig::default();
        config.index.snapshot_path = Some(dir.path().join("index.json"));
        config.embedding.dimensions = StubEmbedder::new().dimensions();

        let embedder = Arc::new(StubEmbedder::new());
        let store = Arc::new(
            LocalVectorStore::from_config(&config, embedder.model_id()).unwrap(),
        );
        let pipeline =
            RagPipeline::new(config.clone(), embedder, Arc::new(EchoLlm), store).unwrap();
        pipeline
            .ingest("doc", "grass is green", DocumentMetadata::default())
            .await
            .unwrap();
        drop(pipeline);

        let embedder = Arc::new(StubEmbedder::new());
        let store = Arc::new(
            LocalVectorStore::from_config(&config, embedder.model_id()).unwrap(),
        );
        let pipeline = RagPipeline::new(config, embedder, Arc::new(EchoLlm), store).unwrap();

        assert_eq!(pipeline.stats().await.unwrap().chunks, 1);
        let results = pipeline.search("grass", 1).await.unwrap();
        assert!(results[0].chunk.text.contains("grass"));
    }

    #[tokio::test]
    async fn test_answer_runs_on_a_spawned_task() {
        let (pipeline, _) = build(small_chunk_config(), Arc::new(EchoLlm));
        pipeline
            .ingest(
                "notes",
                "The sky is blue. Grass is green.",
                DocumentMetadata::default(),
            )
            .await
            .unwrap();

        // answer() and its driver must be usable from a spawned task,
        // which requires the futures involved to be Send.
        let handle = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                let stream = pipeline.answer("what color is grass", &[]).await.unwrap();
                stream.outcome().await.unwrap()
            })
        };
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.status, AnswerStatus::Completed);
        assert!(outcome.answer.contains("Grass is green."));
    }

    #[tokio::test]
    async fn test_settled_query_states_are_evicted() {
        let (pipeline, _) = build(RagConfig::default(), Arc::new(EchoLlm));

        let total = SETTLED_QUERY_RETENTION + 40;
        let mut first_id = None;
        let mut last_id = 0;
        for i in 0..total {
            let stream = pipeline.answer(&format!("query {}", i), &[]).await.unwrap();
            last_id = stream.query_id();
            first_id.get_or_insert(last_id);
            let outcome = stream.outcome().await.unwrap();
            assert_eq!(outcome.status, AnswerStatus::Completed);
        }

        // Old settled states are gone, recent ones are still queryable,
        // and the map itself stays bounded by the retention window.
        assert_eq!(pipeline.query_state(first_id.unwrap()), None);
        assert_eq!(pipeline.query_state(last_id), Some(QueryState::Completed));
        assert!(pipeline.query_states.len() <= SETTLED_QUERY_RETENTION as usize + 1);
    }

    #[tokio::test]
    async fn test_clear_drops_settled_query_states_and_idle_locks() {
        let (pipeline, _) = build(RagConfig::default(), Arc::new(EchoLlm));
        pipeline
            .ingest("doc", "grass is green", DocumentMetadata::default())
            .await
            .unwrap();

        let stream = pipeline.answer("grass", &[]).await.unwrap();
        let query_id = stream.query_id();
        stream.outcome().await.unwrap();
        assert_eq!(pipeline.query_state(query_id), Some(QueryState::Completed));

        pipeline.clear().await.unwrap();
        assert_eq!(pipeline.query_state(query_id), None);
        assert!(pipeline.ingest_locks.is_empty());
    }

    #[tokio::test]
    async fn test_history_reaches_the_prompt() {
        let (pipeline, _) = build(RagConfig::default(), Arc::new(EchoLlm));
        let history = vec![
            ConversationTurn::user("what color is the sky"),
            ConversationTurn::assistant("The sky is blue."),
        ];
        let stream = pipeline.answer("and grass", &history).await.unwrap();
        let outcome = stream.outcome().await.unwrap();
        assert!(outcome.answer.contains("User: what color is the sky"));
        assert!(outcome.answer.contains("Assistant: The sky is blue."));
    }
}
