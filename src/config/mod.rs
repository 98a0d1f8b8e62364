//! Configuration management for ragsql
//!
//! Settings come from a TOML file, then `RAGSQL_<SECTION>__<KEY>` environment
//! overrides, then an optional named profile, and are validated as a whole.

use crate::error::{RagSqlError, Result};
use crate::index::DistanceMetric;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub corpus: CorpusConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Remote queue/store (Redis REST) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub url: String,
    /// Environment variable holding the REST bearer token
    pub token_env: String,
    pub request_list: String,
    pub result_prefix: String,
    pub timeout: String,
}

/// Worker loop pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Wait after finding the queue empty
    pub idle_backoff: String,
    /// Wait after an infrastructure fault outside request processing
    pub fault_backoff: String,
}

/// Labeled corpus source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    pub path: PathBuf,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

/// Similarity index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub metric: DistanceMetric,
    pub snapshot_path: PathBuf,
    /// Reuse a stored snapshot built from the same corpus instead of re-embedding
    pub reuse_snapshot: bool,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: String,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<DistanceMetric>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagSqlError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RagSqlError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RagSqlError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| RagSqlError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(metric) = overrides.metric {
            self.index.metric = metric;
        }

        ConfigValidator::validate(self)
    }

    /// Apply environment variable overrides
    /// Environment variables in format: RAGSQL_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    fn apply_overrides(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("RAGSQL_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "QUEUE__URL" => self.queue.url = value.to_string(),
            "QUEUE__REQUEST_LIST" => self.queue.request_list = value.to_string(),
            "LLM__BASE_URL" => self.llm.base_url = value.to_string(),
            "LLM__MODEL" => self.llm.model = value.to_string(),
            "CORPUS__PATH" => self.corpus.path = PathBuf::from(value),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "INDEX__METRIC" => {
                self.index.metric =
                    value
                        .parse()
                        .map_err(|message| RagSqlError::InvalidConfigValue {
                            path: path.to_string(),
                            message,
                        })?;
            }
            "INDEX__REUSE_SNAPSHOT" => {
                self.index.reuse_snapshot =
                    value.parse().map_err(|_| RagSqlError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as boolean", value),
                    })?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RagSqlError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("ragsql").join("config.toml"))
    }

    pub fn queue_timeout(&self) -> Duration {
        parse_duration(&self.queue.timeout).unwrap_or(Duration::from_secs(10))
    }

    pub fn llm_timeout(&self) -> Duration {
        parse_duration(&self.llm.timeout).unwrap_or(Duration::from_secs(120))
    }

    pub fn idle_backoff(&self) -> Duration {
        parse_duration(&self.worker.idle_backoff).unwrap_or(Duration::from_secs(2))
    }

    pub fn fault_backoff(&self) -> Duration {
        parse_duration(&self.worker.fault_backoff).unwrap_or(Duration::from_secs(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.ragsql");

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            queue: QueueConfig {
                url: "http://localhost:8079".to_string(),
                token_env: "UPSTASH_REDIS_REST_TOKEN".to_string(),
                request_list: "sql_requests".to_string(),
                result_prefix: "result:".to_string(),
                timeout: "10s".to_string(),
            },
            worker: WorkerConfig {
                idle_backoff: "2s".to_string(),
                fault_backoff: "1s".to_string(),
            },
            corpus: CorpusConfig {
                path: PathBuf::from("test.csv"),
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 256,
            },
            index: IndexConfig {
                metric: DistanceMetric::Cosine,
                snapshot_path: data_dir.join("index.sqlite"),
                reuse_snapshot: false,
            },
            llm: LlmConfig {
                provider: "ollama".to_string(),
                base_url: "http://localhost:11434".to_string(),
                model: "hf.co/jurieyel/Llama3-sqlcoder-8b-4bit-GGUF-q4_K_M:latest".to_string(),
                temperature: 0.1,
                timeout: "120s".to_string(),
            },
            profiles: HashMap::new(),
        }
    }
}

/// Parse duration strings such as "2s", "500ms", "1m", "1h" or bare seconds ("7")
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();

    // Check "ms" before "s" because "ms" ends with "s"
    if let Some(ms) = value.strip_suffix("ms") {
        ms.trim().parse().ok().map(Duration::from_millis)
    } else if let Some(secs) = value.strip_suffix('s') {
        secs.trim().parse().ok().map(Duration::from_secs)
    } else if let Some(mins) = value.strip_suffix('m') {
        mins.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = value.strip_suffix('h') {
        hours.trim().parse::<u64>().ok().map(|h| Duration::from_secs(h * 3600))
    } else {
        value.parse().ok().map(Duration::from_secs)
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
