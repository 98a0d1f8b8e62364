use super::{GenerationClient, GenerationError};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client for an Ollama server's non-streaming `/api/generate` endpoint
pub struct OllamaClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl OllamaClient {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| GenerationError::failed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: generate_endpoint(base_url),
            model: model.into(),
            temperature,
        })
    }
}

fn generate_endpoint(base_url: &str) -> String {
    format!("{}/api/generate", base_url.trim_end_matches('/'))
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String, GenerationError> {
        if let Some(error) = self.error {
            return Err(GenerationError::failed(format!("model error: {}", error)));
        }
        self.response
            .ok_or_else(|| GenerationError::failed("response body has no 'response' field"))
    }
}

#[async_trait]
impl GenerationClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::failed(format!("request to {} failed: {}", self.endpoint, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(GenerationError::failed(format!(
                "model server returned {}: {}",
                status, text
            )));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::failed(format!("malformed model response: {}", e)))?;

        parsed.into_text()
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
