//! Embedding capability used to place corpus examples and questions in one vector space
//!
//! - EmbeddingProvider trait for abstraction over backends
//! - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim by default)

mod provider;

pub use provider::{
    is_supported_model, EmbeddingError, EmbeddingProvider, FastEmbedProvider, SUPPORTED_MODELS,
};
