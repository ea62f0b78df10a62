//! ragline-core: exact-scan vector index for the ragline retrieval engine
//!
//! Stores chunk embeddings tagged with the embedding model that produced
//! them, answers cosine k-nearest-neighbor queries, and persists itself as
//! a JSON snapshot. Upserts and queries are linearizable: a query observes
//! an entry either entirely before or entirely after a concurrent upsert.

pub mod distance;
pub mod error;
pub mod index;
pub mod types;

pub use distance::Metric;
pub use error::{IndexError, Result};
pub use index::VectorIndex;
pub use types::{IndexEntry, IndexOptions, SearchHit};
