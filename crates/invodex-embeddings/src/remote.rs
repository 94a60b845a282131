//! Remote embedding provider for OpenAI-compatible `/embeddings` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::embedding::Embedding;
use crate::error::EmbeddingError;
use crate::provider::{EmbeddingProvider, EncodeMode};

/// Configuration for an API-based embedding provider.
#[derive(Debug, Clone)]
pub struct ApiProviderConfig {
    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,

    /// Model to use (e.g., "text-embedding-3-small")
    pub model: String,

    /// API key
    pub api_key: SecretString,

    /// Requested vector dimension. The endpoint must honor it; responses of
    /// any other length are rejected.
    pub dimension: usize,

    /// Optional instruction prefix applied in query mode, for endpoints
    /// serving instruction-tuned models. None for OpenAI.
    pub query_prefix: Option<String>,

    /// Request timeout
    pub timeout: Duration,

    /// Maximum retries on transient failure
    pub max_retries: u32,
}

impl ApiProviderConfig {
    /// Create config for the OpenAI embeddings API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            dimension,
            query_prefix: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// API-based embedding provider.
pub struct ApiProvider {
    client: Client,
    config: ApiProviderConfig,
    id: String,
}

impl ApiProvider {
    pub fn new(config: ApiProviderConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbeddingError::Api(e.to_string()))?;

        let id = format!("api:{}", config.model);
        Ok(Self { client, config, id })
    }

    fn apply_mode(&self, text: &str, mode: EncodeMode) -> String {
        match (mode, &self.config.query_prefix) {
            (EncodeMode::Query, Some(prefix)) => format!("{}{}", prefix, text),
            _ => text.to_string(),
        }
    }

    /// Call the API with retry logic.
    async fn call_api(&self, input: &str) -> Result<Embedding, EmbeddingError> {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(attempt = attempts, provider = %self.id, "Calling embeddings API");

            match self.make_request(input).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    if attempts >= self.config.max_retries {
                        error!(error = %e, "Max retries exceeded");
                        return Err(e);
                    }

                    match backoff.next_backoff() {
                        Some(duration) => {
                            warn!(
                                error = %e,
                                retry_in_ms = duration.as_millis(),
                                "Embedding request failed, retrying"
                            );
                            tokio::time::sleep(duration).await;
                        }
                        None => {
                            error!(error = %e, "Backoff exhausted");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Make a single API request.
    async fn make_request(&self, input: &str) -> Result<Embedding, EmbeddingError> {
        #[derive(Serialize)]
        struct EmbeddingsRequest<'a> {
            input: &'a str,
            model: &'a str,
            dimensions: usize,
        }

        #[derive(Deserialize)]
        struct EmbeddingsResponse {
            data: Vec<EmbeddingsDatum>,
        }

        #[derive(Deserialize)]
        struct EmbeddingsDatum {
            embedding: Vec<f32>,
        }

        let request = EmbeddingsRequest {
            input,
            model: &self.config.model,
            dimensions: self.config.dimension,
        };

        let url = format!("{}/embeddings", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Api(e.to_string()))?;

        if response.status() == 429 {
            return Err(EmbeddingError::RateLimited);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api(format!("HTTP {}: {}", status, body)));
        }

        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Api(e.to_string()))?;

        let values = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingError::Api("no data in response".to_string()))?;

        if values.len() != self.config.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.config.dimension,
                actual: values.len(),
            });
        }

        Ok(Embedding::new(values))
    }
}

#[async_trait]
impl EmbeddingProvider for ApiProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn encode(&self, text: &str, mode: EncodeMode) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }
        let input = self.apply_mode(text, mode);
        self.call_api(&input).await
    }

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        // Minimal probe; the endpoint answering at all is what matters.
        self.make_request("ping").await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_openai_defaults() {
        let config = ApiProviderConfig::openai("sk-test", "text-embedding-3-small", 1024);
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.dimension, 1024);
        assert!(config.query_prefix.is_none());
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_provider_id_includes_model() {
        let config = ApiProviderConfig::openai("sk-test", "text-embedding-3-small", 1024);
        let provider = ApiProvider::new(config).unwrap();
        assert_eq!(provider.id(), "api:text-embedding-3-small");
        assert_eq!(provider.dimension(), 1024);
    }

    #[test]
    fn test_query_prefix_only_in_query_mode() {
        let mut config = ApiProviderConfig::openai("sk-test", "bge-served", 1024);
        config.query_prefix = Some("query: ".to_string());
        let provider = ApiProvider::new(config).unwrap();

        assert_eq!(provider.apply_mode("text", EncodeMode::Document), "text");
        assert_eq!(provider.apply_mode("text", EncodeMode::Query), "query: text");
    }
}
