//! Semantic index over solution records.
//!
//! Queries take a shared read lock and may run concurrently. `rebuild` takes
//! the write lock for its whole duration: it deletes everything (memory and
//! disk) before re-embedding, so no reader can observe a half-built index.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::embedder::{cosine_similarity, Embedder};
use crate::error::IndexError;
use crate::record::{Category, EntryMetadata, Solution, SolutionRecord};
use crate::store::{self, PersistedCollection, PersistedEntry};
use crate::Result;

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "ubuntu_solutions";

#[derive(Debug, Clone)]
struct IndexedEntry {
    seq: usize,
    solution: Solution,
    document: String,
    embedding: Vec<f32>,
}

/// A query hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSolution {
    pub solution: Solution,
    pub score: f32,
}

/// Query parameters for searching the index.
#[derive(Debug, Clone, PartialEq)]
pub struct SolutionQuery {
    pub text: String,
    pub top_k: usize,
    pub category: Option<Category>,
}

impl SolutionQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k: 5,
            category: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }
}

/// Outcome of a full rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebuildSummary {
    pub collection: String,
    pub embedder: String,
    pub total: usize,
    pub by_category: BTreeMap<Category, usize>,
    /// Digest of the persisted collection, when persistence is enabled.
    pub digest: Option<String>,
}

/// Semantic solution index.
pub struct SolutionIndex {
    embedder: Arc<dyn Embedder>,
    collection: String,
    persist_dir: Option<PathBuf>,
    entries: RwLock<Vec<IndexedEntry>>,
}

impl std::fmt::Debug for SolutionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolutionIndex")
            .field("embedder", &self.embedder.name())
            .field("collection", &self.collection)
            .field("persist_dir", &self.persist_dir)
            .finish()
    }
}

impl SolutionIndex {
    /// Empty, memory-only index.
    pub fn in_memory(embedder: Arc<dyn Embedder>, collection: impl Into<String>) -> Self {
        Self {
            embedder,
            collection: collection.into(),
            persist_dir: None,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Open a persisted index under `root`, loading the collection if present.
    pub fn open(
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
        root: &Path,
    ) -> Result<Self> {
        let collection = collection.into();
        let mut entries = Vec::new();

        if let Some(persisted) = store::read_collection(root, &collection)? {
            if persisted.embedder != embedder.name() {
                return Err(IndexError::EmbedderMismatch {
                    collection,
                    expected: embedder.name(),
                    found: persisted.embedder,
                });
            }
            if persisted.dimension != embedder.dimension() {
                return Err(IndexError::DimensionMismatch {
                    expected: embedder.dimension(),
                    actual: persisted.dimension,
                });
            }
            for entry in persisted.entries {
                let record = entry.metadata.to_record()?;
                entries.push(IndexedEntry {
                    seq: entry.seq,
                    solution: Solution {
                        id: entry.id,
                        record,
                    },
                    document: entry.document,
                    embedding: entry.embedding,
                });
            }
            info!(collection = %collection, entries = entries.len(), "opened persisted collection");
        } else {
            warn!(collection = %collection, root = %root.display(), "no persisted collection; index is empty");
        }

        Ok(Self {
            embedder,
            collection,
            persist_dir: Some(root.to_path_buf()),
            entries: RwLock::new(entries),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn embedder_name(&self) -> String {
        self.embedder.name()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Get a solution by id.
    pub async fn get(&self, id: &str) -> Result<Solution> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.solution.id == id)
            .map(|e| e.solution.clone())
            .ok_or_else(|| IndexError::NotFound(id.to_string()))
    }

    /// Replace the whole index with `corpus`.
    ///
    /// Ids are assigned from corpus position (`solution_<n>`). If embedding
    /// fails the index is left empty.
    pub async fn rebuild(&self, corpus: &[SolutionRecord]) -> Result<RebuildSummary> {
        let mut guard = self.entries.write().await;
        guard.clear();
        if let Some(root) = &self.persist_dir {
            store::delete_collection(root, &self.collection)?;
        }

        info!(
            collection = %self.collection,
            solutions = corpus.len(),
            embedder = %self.embedder.name(),
            "rebuilding solution index"
        );

        let documents: Vec<String> = corpus.iter().map(SolutionRecord::document_text).collect();
        let vectors = self.embedder.embed(&documents).await?;
        if vectors.len() != corpus.len() {
            return Err(IndexError::Embedding(format!(
                "embedder returned {} vectors for {} documents",
                vectors.len(),
                corpus.len()
            )));
        }

        let dimension = self.embedder.dimension();
        let mut fresh = Vec::with_capacity(corpus.len());
        let mut by_category = BTreeMap::new();
        for (seq, ((record, document), embedding)) in corpus
            .iter()
            .zip(documents)
            .zip(vectors)
            .enumerate()
        {
            if embedding.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: embedding.len(),
                });
            }
            *by_category.entry(record.category).or_insert(0) += 1;
            fresh.push(IndexedEntry {
                seq,
                solution: Solution::new(seq, record.clone()),
                document,
                embedding,
            });
        }

        let digest = match &self.persist_dir {
            Some(root) => Some(store::write_collection(root, &self.to_persisted(&fresh)?)?),
            None => None,
        };

        *guard = fresh;
        info!(collection = %self.collection, total = guard.len(), "solution index rebuilt");

        Ok(RebuildSummary {
            collection: self.collection.clone(),
            embedder: self.embedder.name(),
            total: guard.len(),
            by_category,
            digest,
        })
    }

    /// Nearest-neighbour query, best first.
    ///
    /// Equal scores are ordered by corpus position so repeated queries
    /// against an unchanged index always rank identically.
    pub async fn query(&self, query: &SolutionQuery) -> Result<Vec<ScoredSolution>> {
        if query.top_k == 0 {
            return Ok(Vec::new());
        }

        let mut vectors = self.embedder.embed(std::slice::from_ref(&query.text)).await?;
        let query_vector = vectors
            .pop()
            .ok_or_else(|| IndexError::Embedding("no vector for query".to_string()))?;

        let guard = self.entries.read().await;
        let mut hits: Vec<(usize, f32, &IndexedEntry)> = guard
            .iter()
            .filter(|e| query.category.map_or(true, |c| e.solution.category() == c))
            .map(|e| (e.seq, cosine_similarity(&query_vector, &e.embedding), e))
            .collect();

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        hits.truncate(query.top_k);

        debug!(
            hits = hits.len(),
            category = ?query.category,
            best = hits.first().map(|h| h.1),
            "index query"
        );

        Ok(hits
            .into_iter()
            .map(|(_, score, e)| ScoredSolution {
                solution: e.solution.clone(),
                score,
            })
            .collect())
    }

    fn to_persisted(&self, entries: &[IndexedEntry]) -> Result<PersistedCollection> {
        let entries = entries
            .iter()
            .map(|e| {
                Ok(PersistedEntry {
                    id: e.solution.id.clone(),
                    seq: e.seq,
                    document: e.document.clone(),
                    embedding: e.embedding.clone(),
                    metadata: EntryMetadata::from_record(&e.solution.record)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PersistedCollection {
            name: self.collection.clone(),
            description: "Ubuntu system repair solutions".to_string(),
            embedder: self.embedder.name(),
            dimension: self.embedder.dimension(),
            built_at: Utc::now(),
            entries,
        })
    }
}
