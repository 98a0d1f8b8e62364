//! Text generation: prompt assembly and the model client seam

mod ollama;
mod prompt;

pub use ollama::OllamaClient;
pub use prompt::{PromptAssembler, PromptError, PROMPT_EXAMPLES};

use async_trait::async_trait;
use thiserror::Error;

/// Any failure while invoking the model, carrying the underlying cause
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Generation failed: {0}")]
    Failed(String),
}

impl GenerationError {
    pub fn failed(cause: impl std::fmt::Display) -> Self {
        GenerationError::Failed(cause.to_string())
    }
}

/// Black-box `prompt -> text` capability
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    fn model_name(&self) -> &str;
}
