use crate::corpus::CorpusError;
use crate::index::IndexError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ragsql
#[derive(Error, Debug)]
pub enum RagSqlError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Index snapshot database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored index snapshot is unreadable
    #[error("Index snapshot error: {0}")]
    Snapshot(String),

    /// Corpus source could not be read
    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    /// Index construction or query failed
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// Worker runtime errors
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for ragsql operations
pub type Result<T> = std::result::Result<T, RagSqlError>;
