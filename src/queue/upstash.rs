//! Upstash-style Redis REST client
//!
//! Commands are issued as `POST <base>/<COMMAND>/<arg>/<arg>` with a bearer
//! token; the reply is `{"result": ...}` or `{"error": "..."}`.

use super::{QueueClient, QueueError};
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use std::time::Duration;

/// Path-segment encoding: everything but unreserved characters is escaped
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub struct UpstashClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

impl UpstashClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, QueueError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(QueueError::Transport("missing REST token".to_string()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", token);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|e| QueueError::Transport(format!("invalid REST token: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| QueueError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn command_url(&self, command: &str, args: &[&str]) -> String {
        command_url(&self.base_url, command, args)
    }

    async fn call(&self, command: &str, args: &[&str]) -> Result<serde_json::Value, QueueError> {
        let url = self.command_url(command, args);
        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| QueueError::Transport(format!("{} failed: {}", command, e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| QueueError::Transport(format!("{} body unreadable: {}", command, e)))?;

        let reply = parse_reply(&body).map_err(|e| {
            if status.is_success() {
                e
            } else {
                QueueError::Store(format!("{} returned {}: {}", command, status, body))
            }
        })?;

        match reply.error {
            Some(error) => Err(QueueError::Store(error)),
            None if !status.is_success() => Err(QueueError::Store(format!(
                "{} returned {}",
                command, status
            ))),
            None => Ok(reply.result),
        }
    }
}

fn command_url(base_url: &str, command: &str, args: &[&str]) -> String {
    let mut url = format!("{}/{}", base_url, command);
    for arg in args {
        url.push('/');
        url.extend(utf8_percent_encode(arg, SEGMENT));
    }
    url
}

fn parse_reply(body: &str) -> Result<Reply, QueueError> {
    serde_json::from_str(body).map_err(|e| QueueError::Protocol(format!("{}: {}", e, body)))
}

fn pop_result(result: serde_json::Value) -> Result<Option<String>, QueueError> {
    match result {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(item) => Ok(Some(item)),
        other => Err(QueueError::Protocol(format!(
            "LPOP returned a non-string item: {}",
            other
        ))),
    }
}

#[async_trait]
impl QueueClient for UpstashClient {
    async fn pop(&self, list: &str) -> Result<Option<String>, QueueError> {
        pop_result(self.call("LPOP", &[list]).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), QueueError> {
        self.call("SET", &[key, value]).await?;
        Ok(())
    }
}
