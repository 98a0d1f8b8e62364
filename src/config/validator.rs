use super::parse_duration;
use crate::config::Config;
use crate::embedding::{is_supported_model, SUPPORTED_MODELS};
use crate::error::{RagSqlError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, reporting every violation at once
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_queue(config, &mut errors);
        Self::validate_worker(config, &mut errors);
        Self::validate_corpus(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_llm(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RagSqlError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_queue(config: &Config, errors: &mut Vec<ValidationError>) {
        let queue = &config.queue;

        if !Self::is_http_url(&queue.url) {
            errors.push(ValidationError::new(
                "queue.url",
                format!("Expected an http(s) URL, got '{}'", queue.url),
            ));
        }

        for (path, value) in [
            ("queue.token_env", &queue.token_env),
            ("queue.request_list", &queue.request_list),
            ("queue.result_prefix", &queue.result_prefix),
        ] {
            if value.trim().is_empty() {
                errors.push(ValidationError::new(path, "Value cannot be empty"));
            }
        }

        Self::check_duration("queue.timeout", &queue.timeout, errors);
    }

    fn validate_worker(config: &Config, errors: &mut Vec<ValidationError>) {
        Self::check_duration("worker.idle_backoff", &config.worker.idle_backoff, errors);
        Self::check_duration("worker.fault_backoff", &config.worker.fault_backoff, errors);
    }

    fn validate_corpus(config: &Config, errors: &mut Vec<ValidationError>) {
        // Existence is checked when the corpus is loaded, after ~ expansion
        if config.corpus.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "corpus.path",
                "Corpus path cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        let model = &config.embedding.model;
        if !is_supported_model(model) {
            errors.push(ValidationError::new(
                "embedding.model",
                format!(
                    "Model must be one of {:?}, got '{}'",
                    SUPPORTED_MODELS, model
                ),
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.index.snapshot_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "index.snapshot_path",
                "Snapshot path cannot be empty",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        let provider = &config.llm.provider;
        let valid_providers = ["ollama"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }

        if !Self::is_http_url(&config.llm.base_url) {
            errors.push(ValidationError::new(
                "llm.base_url",
                format!("Expected an http(s) URL, got '{}'", config.llm.base_url),
            ));
        }

        if config.llm.model.trim().is_empty() {
            errors.push(ValidationError::new("llm.model", "Model name cannot be empty"));
        }

        Self::check_duration("llm.timeout", &config.llm.timeout, errors);
    }

    fn check_duration(path: &str, value: &str, errors: &mut Vec<ValidationError>) {
        if parse_duration(value).is_none() {
            errors.push(ValidationError::new(
                path,
                format!("Invalid duration format: {}", value),
            ));
        }
    }

    fn is_http_url(s: &str) -> bool {
        let rest = s
            .strip_prefix("https://")
            .or_else(|| s.strip_prefix("http://"));
        matches!(rest, Some(host) if !host.is_empty())
    }
}
