//! Labeled corpus of worked text-to-SQL examples
//!
//! The corpus is a CSV file with one worked example per row. Row order defines
//! the example id (0-based row index rendered as a string).

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Columns every corpus source must carry
pub const REQUIRED_COLUMNS: [&str; 4] = ["sql_prompt", "sql_context", "sql", "sql_explanation"];

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Failed to open corpus {path}: {message}")]
    Open { path: String, message: String },

    #[error("Corpus is missing required column '{0}'")]
    MissingColumn(String),

    #[error("Malformed corpus row {row}: {message}")]
    Row { row: usize, message: String },
}

/// One worked example: task text, target SQL, rationale and the schema it ran against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusExample {
    pub id: String,
    pub task_text: String,
    pub sql_statement: String,
    pub explanation: String,
    pub schema_context: String,
}

impl CorpusExample {
    pub fn new(
        id: impl Into<String>,
        task_text: impl Into<String>,
        sql_statement: impl Into<String>,
        explanation: impl Into<String>,
        schema_context: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            task_text: task_text.into(),
            sql_statement: sql_statement.into(),
            explanation: explanation.into(),
            schema_context: schema_context.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CorpusRow {
    sql_prompt: String,
    sql_context: String,
    sql: String,
    sql_explanation: String,
}

/// Load the corpus from a CSV file on disk
pub fn load_corpus(path: &Path) -> Result<Vec<CorpusExample>, CorpusError> {
    let file = std::fs::File::open(path).map_err(|e| CorpusError::Open {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let examples = read_corpus(file)?;

    tracing::info!("Loaded {} corpus examples from {:?}", examples.len(), path);

    Ok(examples)
}

/// Parse corpus rows from any CSV reader
pub fn read_corpus<R: Read>(reader: R) -> Result<Vec<CorpusExample>, CorpusError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| CorpusError::Row {
            row: 0,
            message: e.to_string(),
        })?
        .clone();

    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(CorpusError::MissingColumn(column.to_string()));
        }
    }

    let mut examples = Vec::new();
    for (index, record) in csv_reader.deserialize::<CorpusRow>().enumerate() {
        let row = record.map_err(|e| CorpusError::Row {
            row: index,
            message: e.to_string(),
        })?;

        examples.push(CorpusExample {
            id: index.to_string(),
            task_text: row.sql_prompt,
            sql_statement: row.sql,
            explanation: row.sql_explanation,
            schema_context: row.sql_context,
        });
    }

    Ok(examples)
}

/// Content hash of the corpus source, used to decide whether a stored index is stale
pub fn fingerprint(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}
