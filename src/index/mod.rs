//! Exact nearest-neighbor index over the worked-example corpus
//!
//! Every example is embedded once from its task text and schema context. A
//! query embeds `question` + `schema` the same way and ranks every stored
//! example by distance, breaking ties by ascending example id, so identical
//! inputs always produce identical output.

mod distance;
mod shared;
mod snapshot;

pub use distance::DistanceMetric;
pub use shared::SharedIndex;
pub use snapshot::{IndexSnapshot, SnapshotInfo};

use crate::corpus::CorpusExample;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Joins task/question text and schema into one embedding input
pub const SEPARATOR: &str = " | Schema: ";

/// Number of neighbors the generation prompt is built from
pub const RETRIEVAL_K: usize = 2;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Cannot build an index from an empty corpus")]
    EmptyCorpus,

    #[error("Dimension mismatch for example {id}: expected {expected}, got {actual}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("Duplicate example id: {0}")]
    DuplicateId(String),

    #[error("Corpus has {available} examples but {requested} were requested")]
    InsufficientCorpus { available: usize, requested: usize },

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index lock poisoned")]
    LockPoisoned,
}

/// Build-time settings
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub metric: DistanceMetric,
    /// Number of examples embedded per provider call
    pub batch_size: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Cosine,
            batch_size: 256,
        }
    }
}

/// A stored example with its embedding
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub example: CorpusExample,
}

/// A query hit
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub example: CorpusExample,
    pub distance: f32,
}

/// Text embedded for a corpus example or an incoming question
pub fn embedding_text(text: &str, schema: &str) -> String {
    format!("{}{}{}", text, SEPARATOR, schema)
}

/// Immutable similarity index. Rebuilding produces a new value; see [`SharedIndex`].
pub struct CorpusIndex {
    entries: Vec<IndexEntry>,
    dimension: usize,
    metric: DistanceMetric,
    provider: Arc<dyn EmbeddingProvider>,
}

impl CorpusIndex {
    /// Embed every example and build the index
    ///
    /// Nothing is returned unless every example embedded successfully with the
    /// same dimension, so a partially built index never exists.
    pub fn build(
        examples: Vec<CorpusExample>,
        provider: Arc<dyn EmbeddingProvider>,
        options: &IndexOptions,
    ) -> Result<Self, IndexError> {
        if examples.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }

        let start = std::time::Instant::now();
        let batch_size = options.batch_size.max(1);
        let mut entries = Vec::with_capacity(examples.len());

        for chunk in examples.chunks(batch_size) {
            let texts: Vec<String> = chunk
                .iter()
                .map(|e| embedding_text(&e.task_text, &e.schema_context))
                .collect();

            let vectors = provider.embed_batch(&texts)?;
            if vectors.len() != chunk.len() {
                return Err(EmbeddingError::GenerationError(format!(
                    "Provider returned {} vectors for {} examples",
                    vectors.len(),
                    chunk.len()
                ))
                .into());
            }

            entries.extend(chunk.iter().cloned().zip(vectors).map(|(example, vector)| {
                IndexEntry { vector, example }
            }));

            tracing::debug!("Embedded {}/{} examples", entries.len(), examples.len());
        }

        let index = Self::from_entries(entries, provider, options.metric)?;

        tracing::info!(
            "Built corpus index: {} examples, {}D, metric={}, {}ms",
            index.len(),
            index.dimension,
            index.metric,
            start.elapsed().as_millis()
        );

        Ok(index)
    }

    /// Assemble an index from already-embedded entries, enforcing the index invariants
    pub fn from_entries(
        entries: Vec<IndexEntry>,
        provider: Arc<dyn EmbeddingProvider>,
        metric: DistanceMetric,
    ) -> Result<Self, IndexError> {
        let dimension = match entries.first() {
            Some(first) => first.vector.len(),
            None => return Err(IndexError::EmptyCorpus),
        };

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if entry.vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    id: entry.example.id.clone(),
                    expected: dimension,
                    actual: entry.vector.len(),
                });
            }
            if !seen.insert(entry.example.id.as_str()) {
                return Err(IndexError::DuplicateId(entry.example.id.clone()));
            }
        }

        Ok(Self {
            entries,
            dimension,
            metric,
            provider,
        })
    }

    /// The `k` examples nearest to `question` + `schema`, closest first
    pub fn query(&self, question: &str, schema: &str, k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if self.entries.len() < k {
            return Err(IndexError::InsufficientCorpus {
                available: self.entries.len(),
                requested: k,
            });
        }

        let vector = self.provider.embed(&embedding_text(question, schema))?;
        self.nearest(&vector, k)
    }

    /// The `k` stored examples nearest to an already-embedded query vector
    pub fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if self.entries.len() < k {
            return Err(IndexError::InsufficientCorpus {
                available: self.entries.len(),
                requested: k,
            });
        }
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                id: "<query>".to_string(),
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (self.metric.distance(vector, &entry.vector), entry))
            .collect();

        scored.sort_by(|(da, a), (db, b)| {
            da.total_cmp(db)
                .then_with(|| a.example.id.cmp(&b.example.id))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, entry)| Neighbor {
                example: entry.example.clone(),
                distance,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }
}
