// Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ragsql::embedding::{EmbeddingError, EmbeddingProvider};
use ragsql::generation::{GenerationClient, GenerationError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const CORPUS_CSV: &str = "\
sql_prompt,sql_context,sql,sql_explanation
count rows,t(x int),SELECT COUNT(*) FROM t;,counts every row of t
sum col,t(x int),SELECT SUM(x) FROM t;,adds up column x
average name length,people(name text),SELECT AVG(LENGTH(name)) FROM people;,mean name length
";

/// Bag-of-words embedder over a fixed vocabulary
pub struct KeywordEmbedder {
    vocab: Vec<&'static str>,
    batches: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            vocab: vec!["count", "rows", "sum", "col", "average", "name", "t", "x", "people"],
            batches: AtomicUsize::new(0),
        }
    }

    /// Number of `embed_batch` calls so far
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for KeywordEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0; self.vocab.len()];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            if let Some(slot) = self.vocab.iter().position(|w| *w == token) {
                vector[slot] += 1.0;
            }
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.vocab.len()
    }

    fn model_name(&self) -> &str {
        "keyword-test"
    }
}

/// Model that answers every prompt with the same text and records the prompts
pub struct RecordingModel {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl RecordingModel {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationClient for RecordingModel {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

pub fn write_corpus(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("corpus.csv");
    std::fs::write(&path, contents).unwrap();
    path
}
