use ragsql::cli::{Cli, Commands, ConfigAction};
use ragsql::config::{expand_tilde, Config, ConfigValidator};
use ragsql::corpus;
use ragsql::embedding::{EmbeddingProvider, FastEmbedProvider};
use ragsql::error::{RagSqlError, Result};
use ragsql::extract::extract_sql;
use ragsql::index::IndexSnapshot;
use ragsql::queue::{result_key, MemoryQueue, ResultPayload, UpstashClient};
use ragsql::worker::{load_index, AppContext, RequestWorker, SignalHandler, WorkerSettings};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Run => cmd_run(cli.config, cli.profile),
        Commands::Ask { question, schema } => cmd_ask(cli.config, cli.profile, &question, &schema),
        Commands::Search {
            question,
            schema,
            limit,
            json,
        } => cmd_search(cli.config, cli.profile, &question, &schema, limit, json),
        Commands::Index => cmd_index(cli.config, cli.profile),
        Commands::Extract { file } => cmd_extract(file.as_deref()),
        Commands::Config { action } => cmd_config(cli.config, cli.profile, action),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "ragsql=debug" } else { "ragsql=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| RagSqlError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })
}

fn cmd_run(config_path: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    tracing::info!("Starting ragsql worker...");

    let config = load_config(config_path, profile)?;

    let token = std::env::var(&config.queue.token_env).map_err(|_| {
        RagSqlError::Config(format!(
            "Environment variable {} is not set",
            config.queue.token_env
        ))
    })?;
    let queue = UpstashClient::new(&config.queue.url, &token, config.queue_timeout())
        .map_err(|e| RagSqlError::Config(e.to_string()))?;

    let ctx = Arc::new(AppContext::bootstrap(&config)?);
    let settings = WorkerSettings::from_config(&config);

    runtime()?.block_on(async move {
        let shutdown = SignalHandler::new()?.spawn_shutdown();
        let mut worker = RequestWorker::new(ctx, Arc::new(queue), settings, shutdown);
        worker.run().await;
        Ok::<(), RagSqlError>(())
    })
}

fn cmd_ask(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    question: &str,
    schema: &str,
) -> Result<()> {
    const REQUEST_ID: &str = "cli";

    let config = load_config(config_path, profile)?;
    let ctx = Arc::new(AppContext::bootstrap(&config)?);
    let settings = WorkerSettings::from_config(&config);

    // One pass through the worker over an in-process queue
    let queue = Arc::new(MemoryQueue::new());
    let request = serde_json::json!({ "question": question, "schema": schema, "id": REQUEST_ID });
    queue.push(&settings.request_list, request.to_string());
    let key = result_key(&settings.result_prefix, REQUEST_ID);

    let (_shutdown_tx, shutdown) = watch::channel(false);
    let mut worker = RequestWorker::new(ctx, queue.clone(), settings, shutdown);
    runtime()?
        .block_on(worker.poll_once())
        .map_err(|e| RagSqlError::Worker(e.to_string()))?;

    let raw = queue
        .get(&key)
        .ok_or_else(|| RagSqlError::Worker("request was not answered".to_string()))?;
    let payload: ResultPayload = serde_json::from_str(&raw).map_err(|e| RagSqlError::Json {
        source: e,
        context: "Failed to decode result payload".to_string(),
    })?;

    match payload {
        ResultPayload::Sql { sql } => {
            println!("{}", sql);
            Ok(())
        }
        ResultPayload::Error { error } => Err(RagSqlError::Worker(error)),
    }
}

fn cmd_search(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    question: &str,
    schema: &str,
    limit: usize,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let index = load_index(&config, embedding_provider(&config)?, false)?;
    let neighbors = index.query(question, schema, limit)?;

    if json {
        let rows: Vec<_> = neighbors
            .iter()
            .map(|n| serde_json::json!({ "distance": n.distance, "example": n.example }))
            .collect();
        let out = serde_json::to_string_pretty(&rows).map_err(|e| RagSqlError::Json {
            source: e,
            context: "Failed to serialize search results".to_string(),
        })?;
        println!("{}", out);
        return Ok(());
    }

    for (rank, neighbor) in neighbors.iter().enumerate() {
        let example = &neighbor.example;
        println!(
            "{}. [{}] distance={:.4}\n   Task: {}\n   SQL:  {}\n",
            rank + 1,
            example.id,
            neighbor.distance,
            example.task_text,
            example.sql_statement
        );
    }
    Ok(())
}

fn cmd_index(config_path: Option<PathBuf>, profile: Option<String>) -> Result<()> {
    let config = load_config(config_path, profile)?;
    let index = load_index(&config, embedding_provider(&config)?, true)?;

    println!("✓ Indexed {} examples", index.len());
    println!("  Model: {} ({}D)", index.model_name(), index.dimension());
    println!("  Metric: {}", index.metric());

    let snapshot = IndexSnapshot::open(&expand_tilde(&config.index.snapshot_path))?;
    if let Some(info) = snapshot.info()? {
        println!("  Snapshot: {} (built {})", info.fingerprint, info.built_at);
    }
    Ok(())
}

fn cmd_extract(file: Option<&Path>) -> Result<()> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path).map_err(|e| RagSqlError::Io {
            source: e,
            context: format!("Failed to read {:?}", path),
        })?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| RagSqlError::Io {
                    source: e,
                    context: "Failed to read stdin".to_string(),
                })?;
            buf
        }
    };

    println!("{}", extract_sql(&raw));
    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            let out = toml::to_string_pretty(&config)?;
            println!("{}", out);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);

            let corpus_path = expand_tilde(&config.corpus.path);
            if !corpus_path.exists() {
                println!("⚠ Corpus file not found: {}", corpus_path.display());
            } else {
                let examples = corpus::load_corpus(&corpus_path)?;
                println!("  Corpus: {} examples", examples.len());
            }
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RagSqlError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if path.exists() {
        return match profile {
            Some(profile) => Config::load_with_profile(&path, &profile),
            None => Config::load(&path),
        };
    }

    tracing::warn!("Config file not found, using defaults. Run 'ragsql config init' to create one.");
    let mut config = Config::default();
    config.apply_env_overrides();
    ConfigValidator::validate(&config)?;

    if let Some(profile) = profile {
        config.apply_profile(&profile)?;
    }

    Ok(config)
}

fn embedding_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider = FastEmbedProvider::new(&config.embedding.model)
        .map_err(|e| RagSqlError::Index(e.into()))?;
    Ok(Arc::new(provider))
}
