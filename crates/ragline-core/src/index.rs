//! Exact-scan vector index with snapshot persistence

use std::collections::{BTreeSet, HashMap};
use std::fs;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::distance::Metric;
use crate::error::{IndexError, Result};
use crate::types::{IndexEntry, IndexOptions, SearchHit};

/// Entry map plus the document-to-chunks reverse map.
///
/// Both live under one lock so that upsert/delete and query are
/// linearizable: a query either sees all of a write or none of it.
#[derive(Default)]
struct Inner {
    entries: HashMap<String, IndexEntry>,
    by_document: HashMap<String, BTreeSet<String>>,
}

/// On-disk snapshot format
#[derive(Serialize, Deserialize)]
struct Snapshot {
    model_id: String,
    dimensions: usize,
    #[serde(default)]
    metric: Metric,
    entries: Vec<IndexEntry>,
}

/// Vector index over chunk embeddings.
///
/// Must be opened with [`VectorIndex::open`] before use; every operation
/// on an unopened index fails with [`IndexError::NotReady`].
pub struct VectorIndex {
    options: IndexOptions,
    inner: RwLock<Inner>,
    ready: RwLock<bool>,
}

impl VectorIndex {
    /// Create an unopened index handle
    pub fn new(options: IndexOptions) -> Self {
        Self {
            options,
            inner: RwLock::new(Inner::default()),
            ready: RwLock::new(false),
        }
    }

    /// Open the index, loading the snapshot if one exists.
    ///
    /// A snapshot written by a different embedding model is rejected with
    /// [`IndexError::ModelVersionMismatch`]; the owner must reindex rather
    /// than mix vectors from two models in one query.
    pub fn open(&self) -> Result<()> {
        if let Some(path) = &self.options.snapshot_path {
            if path.exists() {
                let raw = fs::read_to_string(path)?;
                let snapshot: Snapshot = serde_json::from_str(&raw)
                    .map_err(|e| IndexError::Corrupt(e.to_string()))?;

                if snapshot.model_id != self.options.model_id {
                    return Err(IndexError::ModelVersionMismatch {
                        expected: self.options.model_id.clone(),
                        actual: snapshot.model_id,
                    });
                }
                if snapshot.dimensions != self.options.dimensions {
                    return Err(IndexError::DimensionMismatch {
                        expected: self.options.dimensions,
                        actual: snapshot.dimensions,
                    });
                }
                if snapshot.metric != self.options.metric {
                    return Err(IndexError::Corrupt(format!(
                        "snapshot metric {:?} does not match configured {:?}",
                        snapshot.metric, self.options.metric
                    )));
                }

                let mut inner = self.inner.write();
                for entry in snapshot.entries {
                    inner
                        .by_document
                        .entry(entry.document_id.clone())
                        .or_default()
                        .insert(entry.chunk_id.clone());
                    inner.entries.insert(entry.chunk_id.clone(), entry);
                }
                tracing::info!(
                    entries = inner.entries.len(),
                    "loaded index snapshot from {}",
                    path.display()
                );
            }
        }

        *self.ready.write() = true;
        Ok(())
    }

    /// Convenience: create and open in one step
    pub fn open_with(options: IndexOptions) -> Result<Self> {
        let index = Self::new(options);
        index.open()?;
        Ok(index)
    }

    fn ensure_ready(&self) -> Result<()> {
        if *self.ready.read() {
            Ok(())
        } else {
            Err(IndexError::NotReady)
        }
    }

    fn validate_entry(&self, entry: &IndexEntry) -> Result<()> {
        if entry.vector.len() != self.options.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.options.dimensions,
                actual: entry.vector.len(),
            });
        }
        if entry.model_id != self.options.model_id {
            return Err(IndexError::ModelVersionMismatch {
                expected: self.options.model_id.clone(),
                actual: entry.model_id.clone(),
            });
        }
        Ok(())
    }

    /// Insert or replace entries, idempotent by chunk id.
    ///
    /// Re-inserting a chunk id replaces the prior vector and metadata
    /// entirely. The whole batch is validated before anything is written,
    /// so a bad entry leaves the index untouched.
    pub fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()> {
        self.ensure_ready()?;

        for entry in &entries {
            self.validate_entry(entry)?;
        }

        let mut inner = self.inner.write();
        for entry in entries {
            if let Some(old) = inner.entries.get(&entry.chunk_id) {
                if old.document_id != entry.document_id {
                    let old_doc = old.document_id.clone();
                    if let Some(set) = inner.by_document.get_mut(&old_doc) {
                        set.remove(&entry.chunk_id);
                        if set.is_empty() {
                            inner.by_document.remove(&old_doc);
                        }
                    }
                }
            }
            inner
                .by_document
                .entry(entry.document_id.clone())
                .or_default()
                .insert(entry.chunk_id.clone());
            inner.entries.insert(entry.chunk_id.clone(), entry);
        }
        Ok(())
    }

    /// Remove every entry belonging to a document.
    ///
    /// Idempotent: deleting an absent document id is a no-op returning 0.
    pub fn delete_document(&self, document_id: &str) -> Result<usize> {
        self.ensure_ready()?;

        let mut inner = self.inner.write();
        let chunk_ids = match inner.by_document.remove(document_id) {
            Some(ids) => ids,
            None => return Ok(0),
        };

        let mut deleted = 0;
        for chunk_id in chunk_ids {
            if inner.entries.remove(&chunk_id).is_some() {
                deleted += 1;
            }
        }
        tracing::debug!(document_id, deleted, "deleted document entries");
        Ok(deleted)
    }

    /// k-nearest-neighbor query under the configured metric.
    ///
    /// Results are ordered by descending score, ties broken by chunk id
    /// ascending for determinism. The query vector must carry the same
    /// model tag the index was built with.
    pub fn query(&self, vector: &[f32], k: usize, model_id: &str) -> Result<Vec<SearchHit>> {
        self.ensure_ready()?;

        if k == 0 {
            return Err(IndexError::InvalidQuery("k must be >= 1".to_string()));
        }
        if vector.len() != self.options.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.options.dimensions,
                actual: vector.len(),
            });
        }
        if model_id != self.options.model_id {
            return Err(IndexError::ModelVersionMismatch {
                expected: self.options.model_id.clone(),
                actual: model_id.to_string(),
            });
        }

        let inner = self.inner.read();
        let mut hits: Vec<SearchHit> = inner
            .entries
            .values()
            .map(|entry| SearchHit {
                chunk_id: entry.chunk_id.clone(),
                document_id: entry.document_id.clone(),
                score: self.options.metric.score(vector, &entry.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Metadata of a stored entry, if present
    pub fn get_metadata(
        &self,
        chunk_id: &str,
    ) -> Result<Option<HashMap<String, serde_json::Value>>> {
        self.ensure_ready()?;
        let inner = self.inner.read();
        Ok(inner.entries.get(chunk_id).map(|e| e.metadata.clone()))
    }

    /// Number of entries in the index
    pub fn len(&self) -> Result<usize> {
        self.ensure_ready()?;
        Ok(self.inner.read().entries.len())
    }

    /// Whether the index holds no entries
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of distinct documents with entries in the index
    pub fn document_count(&self) -> Result<usize> {
        self.ensure_ready()?;
        Ok(self.inner.read().by_document.len())
    }

    /// Remove every entry
    pub fn clear(&self) -> Result<()> {
        self.ensure_ready()?;
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.by_document.clear();
        Ok(())
    }

    /// Embedding model the index holds vectors for
    pub fn model_id(&self) -> &str {
        &self.options.model_id
    }

    /// Configured embedding dimensionality
    pub fn dimensions(&self) -> usize {
        self.options.dimensions
    }

    /// Write a snapshot to the configured path, if one is set
    pub fn save(&self) -> Result<()> {
        self.ensure_ready()?;

        let Some(path) = &self.options.snapshot_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let inner = self.inner.read();
        let snapshot = Snapshot {
            model_id: self.options.model_id.clone(),
            dimensions: self.options.dimensions,
            metric: self.options.metric,
            entries: inner.entries.values().cloned().collect(),
        };
        drop(inner);

        let raw = serde_json::to_string(&snapshot)
            .map_err(|e| IndexError::Corrupt(e.to_string()))?;
        fs::write(path, raw)?;
        tracing::info!(
            entries = snapshot.entries.len(),
            "saved index snapshot to {}",
            path.display()
        );
        Ok(())
    }
}
