//! ragsql - retrieval-augmented text-to-SQL worker
//!
//! Pops natural-language questions from a durable queue, retrieves the two
//! most similar worked examples from a labeled corpus, prompts a generative
//! model with them, and publishes the cleaned-up SQL (or an error) back to the
//! store under `result:<id>`.

pub mod cli;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod index;
pub mod queue;
pub mod worker;

pub use error::{RagSqlError, Result};
