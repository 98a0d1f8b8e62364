//! SQLite persistence for a built corpus index
//!
//! A snapshot is always written whole: the tables are dropped and recreated
//! inside one transaction, so a reader sees either the previous snapshot or
//! the new one.

use super::{CorpusIndex, DistanceMetric, IndexEntry};
use crate::corpus::CorpusExample;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagSqlError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

/// Metadata describing the stored snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotInfo {
    pub fingerprint: String,
    pub model: String,
    pub metric: DistanceMetric,
    pub dimension: usize,
    pub count: usize,
    pub built_at: String,
}

pub struct IndexSnapshot {
    conn: Connection,
}

impl IndexSnapshot {
    /// Open (or create) the snapshot database
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RagSqlError::Io {
                source: e,
                context: format!("Failed to create snapshot directory: {:?}", parent),
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Ok(Self { conn })
    }

    /// Replace whatever is stored with `index`
    pub fn save(&mut self, index: &CorpusIndex, fingerprint: &str) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute_batch(
            "
            DROP TABLE IF EXISTS examples;
            DROP TABLE IF EXISTS snapshot_meta;

            CREATE TABLE examples (
                position INTEGER PRIMARY KEY,
                id TEXT NOT NULL UNIQUE,
                task_text TEXT NOT NULL,
                sql_statement TEXT NOT NULL,
                explanation TEXT NOT NULL,
                schema_context TEXT NOT NULL,
                vector BLOB NOT NULL
            );

            CREATE TABLE snapshot_meta (
                fingerprint TEXT NOT NULL,
                model TEXT NOT NULL,
                metric TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                count INTEGER NOT NULL,
                built_at TEXT NOT NULL
            );
            ",
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO examples
                    (position, id, task_text, sql_statement, explanation, schema_context, vector)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for (position, entry) in index.entries().iter().enumerate() {
                let example = &entry.example;
                stmt.execute(params![
                    position as i64,
                    &example.id,
                    &example.task_text,
                    &example.sql_statement,
                    &example.explanation,
                    &example.schema_context,
                    encode_vector(&entry.vector),
                ])?;
            }
        }

        tx.execute(
            "INSERT INTO snapshot_meta (fingerprint, model, metric, dimension, count, built_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                fingerprint,
                index.model_name(),
                index.metric().as_str(),
                index.dimension() as i64,
                index.len() as i64,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;

        tx.commit()?;

        tracing::info!("Saved index snapshot ({} examples)", index.len());

        Ok(())
    }

    /// Metadata of the stored snapshot, if one exists
    pub fn info(&self) -> Result<Option<SnapshotInfo>> {
        let has_meta: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'snapshot_meta')",
            [],
            |row| row.get(0),
        )?;
        if !has_meta {
            return Ok(None);
        }

        let row = self
            .conn
            .query_row(
                "SELECT fingerprint, model, metric, dimension, count, built_at FROM snapshot_meta LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((fingerprint, model, metric, dimension, count, built_at)) = row else {
            return Ok(None);
        };

        let metric = metric.parse::<DistanceMetric>().map_err(RagSqlError::Snapshot)?;

        Ok(Some(SnapshotInfo {
            fingerprint,
            model,
            metric,
            dimension: dimension as usize,
            count: count as usize,
            built_at,
        }))
    }

    /// Load the stored index if it was built from the same corpus, model and metric
    pub fn load(
        &self,
        fingerprint: &str,
        provider: Arc<dyn EmbeddingProvider>,
        metric: DistanceMetric,
    ) -> Result<Option<CorpusIndex>> {
        let Some(info) = self.info()? else {
            return Ok(None);
        };

        if info.fingerprint != fingerprint
            || info.model != provider.model_name()
            || info.metric != metric
        {
            tracing::info!(
                "Index snapshot is stale (model={}, metric={}), rebuilding",
                info.model,
                info.metric
            );
            return Ok(None);
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, task_text, sql_statement, explanation, schema_context, vector
             FROM examples ORDER BY position",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    CorpusExample {
                        id: row.get(0)?,
                        task_text: row.get(1)?,
                        sql_statement: row.get(2)?,
                        explanation: row.get(3)?,
                        schema_context: row.get(4)?,
                    },
                    row.get::<_, Vec<u8>>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if rows.len() != info.count {
            return Err(RagSqlError::Snapshot(format!(
                "Snapshot lists {} examples but holds {}",
                info.count,
                rows.len()
            )));
        }

        let mut entries = Vec::with_capacity(rows.len());
        for (example, blob) in rows {
            let vector = decode_vector(&blob).ok_or_else(|| {
                RagSqlError::Snapshot(format!("Corrupt vector for example {}", example.id))
            })?;
            entries.push(IndexEntry { vector, example });
        }

        let index = CorpusIndex::from_entries(entries, provider, metric)?;
        tracing::info!("Loaded index snapshot ({} examples)", index.len());

        Ok(Some(index))
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
