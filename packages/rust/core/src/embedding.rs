//! Embedding providers.
//!
//! [`OpenAiEmbedder`] talks to any OpenAI-compatible `/embeddings` endpoint
//! and retries rate limits and server errors with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use atomizer_shared::{AtomizerError, Embedding, EmbeddingConfig, Result};

/// Turns a piece of text into a vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;
}

/// Async client for OpenAI-compatible embedding endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    max_retries: usize,
    backoff_base: Duration,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        dimensions: Option<usize>,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(AtomizerError::config("missing embedding API key"));
        }
        if model.trim().is_empty() {
            return Err(AtomizerError::config("missing embedding model name"));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| AtomizerError::config("invalid embedding API key"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| AtomizerError::Embedding(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimensions,
            max_retries: max_retries.max(1),
            backoff_base: Duration::from_millis(500),
        })
    }

    /// Build from the `[embedding]` config section and a resolved API key.
    pub fn from_config(config: &EmbeddingConfig, api_key: &str) -> Result<Self> {
        Self::new(
            api_key,
            &config.base_url,
            &config.model,
            config.dimensions,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )
    }

    /// Override the first retry delay (doubles per attempt).
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn retry_backoff(&self, attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        self.backoff_base * (1 << capped)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut attempt = 0usize;
        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: text,
                dimensions: self.dimensions,
            };

            match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
                            AtomizerError::Embedding(format!("invalid embedding response: {e}"))
                        })?;
                        let embedding = parsed
                            .data
                            .into_iter()
                            .next()
                            .map(|entry| entry.embedding)
                            .ok_or_else(|| {
                                AtomizerError::Embedding("failed to generate embedding".into())
                            })?;
                        debug!(dims = embedding.len(), "embedding received");
                        return Ok(embedding);
                    }

                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if Self::should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(%status, attempt, "embedding request failed, retrying");
                        tokio::time::sleep(self.retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(AtomizerError::Embedding(format!(
                        "embeddings request failed ({status}): {body}"
                    )));
                }
                Err(e) => {
                    if (e.is_timeout() || e.is_connect()) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(error = %e, attempt, "embedding request error, retrying");
                        tokio::time::sleep(self.retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(AtomizerError::Embedding(e.to_string()));
                }
            }
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
