//! Adapters to the external durable queue/store and the payloads crossing it
//!
//! Pending requests are popped from a named list; each result is stored as a
//! JSON string at `result:<id>`. Values on the wire are percent-encoded JSON.

mod memory;
mod payload;
mod upstash;

pub use memory::MemoryQueue;
pub use payload::{decode_request, result_key, MalformedRequest, Request, ResultPayload};
pub use upstash::UpstashClient;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue request failed: {0}")]
    Transport(String),

    #[error("Queue store returned an error: {0}")]
    Store(String),

    #[error("Malformed queue response: {0}")]
    Protocol(String),
}

/// The two operations the worker needs from the remote key-value/list service
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Remove and return the head of `list`, or `None` when it is empty
    async fn pop(&self, list: &str) -> Result<Option<String>, QueueError>;

    /// Store `value` at `key`, overwriting any previous value
    async fn set(&self, key: &str, value: &str) -> Result<(), QueueError>;
}
