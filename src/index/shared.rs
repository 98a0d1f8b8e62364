//! Process-wide handle to the current corpus index

use super::{CorpusIndex, IndexError, IndexOptions};
use crate::corpus::CorpusExample;
use crate::embedding::EmbeddingProvider;
use std::sync::{Arc, RwLock};

/// Holds the live index and swaps it atomically on rebuild
///
/// Readers clone the inner `Arc` and query it without holding the lock, so a
/// rebuild never blocks or disturbs an in-flight query.
#[derive(Clone)]
pub struct SharedIndex {
    current: Arc<RwLock<Arc<CorpusIndex>>>,
}

impl SharedIndex {
    pub fn new(index: CorpusIndex) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(index))),
        }
    }

    /// Snapshot of the index currently being served
    pub fn current(&self) -> Result<Arc<CorpusIndex>, IndexError> {
        self.current
            .read()
            .map(|guard| Arc::clone(&*guard))
            .map_err(|_| IndexError::LockPoisoned)
    }

    /// Replace the served index, returning the previous one
    pub fn replace(&self, index: CorpusIndex) -> Result<Arc<CorpusIndex>, IndexError> {
        let mut guard = self.current.write().map_err(|_| IndexError::LockPoisoned)?;
        Ok(std::mem::replace(&mut *guard, Arc::new(index)))
    }

    /// Build a fresh index and swap it in; on failure the previous index stays live
    pub fn rebuild(
        &self,
        examples: Vec<CorpusExample>,
        provider: Arc<dyn EmbeddingProvider>,
        options: &IndexOptions,
    ) -> Result<(), IndexError> {
        let index = CorpusIndex::build(examples, provider, options)?;
        self.replace(index)?;
        Ok(())
    }
}
