/// Embedding provider trait and FastEmbed implementation
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Black-box `text -> fixed-length vector` capability
///
/// Implementations must be deterministic: the same text always yields the same vector.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts, one vector per input in input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Model names accepted by [`FastEmbedProvider::new`]
pub const SUPPORTED_MODELS: [&str; 3] = ["all-MiniLM-L6-v2", "bge-small-en-v1.5", "bge-base-en-v1.5"];

fn resolve_model(model_name: &str) -> Result<(EmbeddingModel, usize, usize), EmbeddingError> {
    // (model, dimension, approximate download size in MB)
    match model_name {
        "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384, 90)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384, 130)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768, 440)),
        _ => Err(EmbeddingError::InitializationError(format!(
            "Unsupported model: {}. Supported: {}",
            model_name,
            SUPPORTED_MODELS.join(", ")
        ))),
    }
}

/// Whether [`FastEmbedProvider::new`] accepts `model_name`
pub fn is_supported_model(model_name: &str) -> bool {
    resolve_model(model_name).is_ok()
}

/// Local sentence-embedding provider backed by FastEmbed
///
/// Models are downloaded on first use into the Hugging Face cache and run
/// fully offline afterwards.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension, model_size_mb) = resolve_model(model_name)?;

        tracing::info!(
            "Initializing embedding model: {} ({}D, ~{}MB download if not cached)",
            model_name,
            dimension,
            model_size_mb
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), EmbeddingError> {
        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut embeddings = self.embed_batch(&[text.to_string()])?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Dropping empty inputs would shift every later vector onto the wrong id
        if let Some(position) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput(format!(
                "Empty text at position {}",
                position
            )));
        }

        let embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::GenerationError(format!(
                "Model returned {} embeddings for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }

        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_models() {
        let (_, dim, _) = resolve_model("all-MiniLM-L6-v2").unwrap();
        assert_eq!(dim, 384);
        let (_, dim, _) = resolve_model("bge-base-en-v1.5").unwrap();
        assert_eq!(dim, 768);
    }

    #[test]
    fn test_supported_model_names_are_exact() {
        assert!(is_supported_model("bge-small-en-v1.5"));
        assert!(is_supported_model("all-minilm-l6-v2"));
        assert!(!is_supported_model("BGE-SMALL-EN-V1.5"));
    }

    #[test]
    fn test_resolve_unknown_model() {
        let err = resolve_model("word2vec").unwrap_err();
        assert!(err.to_string().contains("Unsupported model"));
    }

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    fn test_batch_embedding_keeps_order() {
        let provider = FastEmbedProvider::new(SUPPORTED_MODELS[0]).unwrap();
        let texts = vec![
            "count rows | Schema: t(x int)".to_string(),
            "sum col | Schema: t(x int)".to_string(),
        ];

        let embeddings = provider.embed_batch(&texts).unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0], provider.embed(&texts[0]).unwrap());
    }

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test -- --ignored
    fn test_empty_text_rejected() {
        let provider = FastEmbedProvider::new(SUPPORTED_MODELS[0]).unwrap();
        let texts = vec!["SELECT 1".to_string(), "  ".to_string()];
        assert!(matches!(
            provider.embed_batch(&texts),
            Err(EmbeddingError::InvalidInput(_))
        ));
    }
}
