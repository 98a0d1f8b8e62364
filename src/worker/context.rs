//! Application context: everything a request needs, built once at startup

use crate::config::{expand_tilde, Config};
use crate::corpus;
use crate::embedding::{EmbeddingProvider, FastEmbedProvider};
use crate::error::{RagSqlError, Result};
use crate::extract::extract_sql;
use crate::generation::{GenerationClient, GenerationError, OllamaClient, PromptAssembler, PromptError};
use crate::index::{
    CorpusIndex, IndexError, IndexOptions, IndexSnapshot, Neighbor, SharedIndex, RETRIEVAL_K,
};
use std::sync::Arc;
use thiserror::Error;

/// Anything that stops one request from producing SQL
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] IndexError),

    #[error("Prompt assembly failed: {0}")]
    Prompt(#[from] PromptError),

    #[error("{0}")]
    Generation(#[from] GenerationError),

    #[error("Request cancelled: worker is shutting down")]
    Cancelled,
}

/// Shared, read-only collaborators of the request pipeline
pub struct AppContext {
    index: SharedIndex,
    assembler: PromptAssembler,
    generator: Arc<dyn GenerationClient>,
}

impl AppContext {
    pub fn new(index: SharedIndex, generator: Arc<dyn GenerationClient>) -> Self {
        Self {
            index,
            assembler: PromptAssembler::new(),
            generator,
        }
    }

    /// Wire up the embedding model, the index and the model client from configuration
    pub fn bootstrap(config: &Config) -> Result<Self> {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(
            FastEmbedProvider::new(&config.embedding.model)
                .map_err(|e| RagSqlError::Index(e.into()))?,
        );

        let index = load_index(config, provider, false)?;

        let generator = OllamaClient::new(
            &config.llm.base_url,
            config.llm.model.clone(),
            config.llm.temperature,
            config.llm_timeout(),
        )
        .map_err(|e| RagSqlError::Config(e.to_string()))?;

        tracing::info!("Generation model: {}", generator.model_name());

        Ok(Self::new(SharedIndex::new(index), Arc::new(generator)))
    }

    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    /// Nearest worked examples for a question
    pub fn retrieve(&self, question: &str, schema: &str) -> std::result::Result<Vec<Neighbor>, PipelineError> {
        let index = self.index.current()?;
        Ok(index.query(question, schema, RETRIEVAL_K)?)
    }

    /// Retrieval followed by prompt assembly
    pub fn prompt_for(&self, question: &str, schema: &str) -> std::result::Result<String, PipelineError> {
        let neighbors = self.retrieve(question, schema)?;

        for neighbor in &neighbors {
            tracing::debug!(
                "Retrieved example {} (distance {:.4})",
                neighbor.example.id,
                neighbor.distance
            );
        }

        let examples: Vec<_> = neighbors.into_iter().map(|n| n.example).collect();
        Ok(self.assembler.assemble(&examples, question, schema)?)
    }

    /// Full pipeline: retrieve, assemble, generate, extract
    pub async fn generate_sql(&self, question: &str, schema: &str) -> std::result::Result<String, PipelineError> {
        let prompt = self.prompt_for(question, schema)?;
        let raw = self.generator.generate(&prompt).await?;

        tracing::trace!("Raw model output: {}", raw);

        Ok(extract_sql(&raw))
    }
}

/// Build the corpus index, reusing a matching snapshot when configured to
pub fn load_index(
    config: &Config,
    provider: Arc<dyn EmbeddingProvider>,
    force_rebuild: bool,
) -> Result<CorpusIndex> {
    let corpus_path = expand_tilde(&config.corpus.path);
    let fingerprint = corpus::fingerprint(&corpus_path).map_err(|e| RagSqlError::Io {
        source: e,
        context: format!("Failed to read corpus: {:?}", corpus_path),
    })?;

    let snapshot_path = expand_tilde(&config.index.snapshot_path);

    if config.index.reuse_snapshot && !force_rebuild {
        let stored = IndexSnapshot::open(&snapshot_path).and_then(|snapshot| {
            snapshot.load(&fingerprint, provider.clone(), config.index.metric)
        });
        match stored {
            Ok(Some(index)) => return Ok(index),
            Ok(None) => {}
            Err(e) => tracing::warn!("Index snapshot unusable, rebuilding: {}", e),
        }
    }

    let examples = corpus::load_corpus(&corpus_path)?;
    let options = IndexOptions {
        metric: config.index.metric,
        batch_size: config.embedding.batch_size,
    };
    let index = CorpusIndex::build(examples, provider, &options)?;

    let saved = IndexSnapshot::open(&snapshot_path)
        .and_then(|mut snapshot| snapshot.save(&index, &fingerprint));
    if let Err(e) = saved {
        tracing::warn!("Failed to save index snapshot: {}", e);
    }

    Ok(index)
}
