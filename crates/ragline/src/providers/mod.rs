//! Provider abstractions for embeddings, generation, and vector storage
//!
//! Each backend implements a narrow capability trait and is selected by
//! configuration at construction; the pipeline only ever sees the traits.

pub mod embedding;
pub mod llm;
pub mod local;
pub mod ollama;
pub mod vector_store;

pub use embedding::EmbeddingProvider;
pub use llm::{LlmProvider, TokenStream};
pub use local::LocalVectorStore;
pub use ollama::{OllamaClient, OllamaEmbedder, OllamaLlm};
pub use vector_store::VectorStoreProvider;
