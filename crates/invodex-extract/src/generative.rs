//! Generative field extractor.
//!
//! Fallback stage for documents no template covers: an OpenAI-compatible
//! chat completion prompted with the document text, returning a structured
//! field set. Network failures are transient and retried with bounded
//! backoff; an unusable response body is not.

use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use invodex_types::{ExtractedFields, INVOICE_CATEGORIES};

use crate::error::ExtractError;
use crate::json::extract_json_object;

/// Extraction temperature: factual work, keep it near-deterministic.
const EXTRACTION_TEMPERATURE: f32 = 0.1;

/// Token ceiling for the structured response.
const EXTRACTION_MAX_TOKENS: u32 = 2000;

/// A collaborator that turns unstructured document text into a field set.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Stable extractor identifier for logs and reports.
    fn id(&self) -> &str;

    /// Extract structured fields from document text.
    async fn extract(&self, document_text: &str) -> Result<ExtractedFields, ExtractError>;
}

/// Configuration for the API-based extractor.
#[derive(Debug, Clone)]
pub struct ApiExtractorConfig {
    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,

    /// Model to use
    pub model: String,

    /// API key
    pub api_key: SecretString,

    /// Request timeout
    pub timeout: Duration,

    /// Maximum retries on transient failure
    pub max_retries: u32,
}

impl ApiExtractorConfig {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

/// API-based generative extractor.
pub struct ApiExtractor {
    client: Client,
    config: ApiExtractorConfig,
    id: String,
}

impl ApiExtractor {
    pub fn new(config: ApiExtractorConfig) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExtractError::Provider(e.to_string()))?;

        let id = format!("api:{}", config.model);
        Ok(Self { client, config, id })
    }

    /// Build the extraction prompt.
    fn build_prompt(document_text: &str) -> String {
        let categories = INVOICE_CATEGORIES
            .iter()
            .map(|c| format!("  * \"{}\"", c))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Extract invoice information from this text and return ONLY a valid JSON object with no additional text or markdown.

Invoice Text:
{document_text}

Return ONLY this JSON format (no explanations, no markdown):
{{
    "vendor": "vendor name here",
    "invoice_number": "invoice number or null",
    "date": "MM/DD/YYYY or null",
    "total_amount": 0.00,
    "category": "category here",
    "purchaser": "purchaser name or null",
    "is_recurring": false,
    "line_items": []
}}

Extract:
- vendor: Company/business name from top of invoice
- invoice_number: Invoice/order/receipt number
- date: Date in MM/DD/YYYY format
- total_amount: Total amount as number
- purchaser: Name of person/entity who made the purchase if shown on invoice, otherwise null
- category: Classify into ONE of these categories based on vendor and line items:
{categories}
- is_recurring: true if this appears to be a subscription or recurring charge (monthly/annual), false otherwise
- line_items: Each line with description, quantity, unit_price and total, or empty"#
        )
    }

    /// Call the API with retry logic.
    async fn call_api(&self, prompt: &str) -> Result<String, ExtractError> {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(attempt = attempts, extractor = %self.id, "Calling extraction API");

            match self.make_request(prompt).await {
                Ok(content) => return Ok(content),
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
                                "Extraction request failed, retrying"
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

    /// Make a single chat-completion request.
    async fn make_request(&self, prompt: &str) -> Result<String, ExtractError> {
        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Serialize)]
        struct ChatMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<ChatChoice>,
        }

        #[derive(Deserialize)]
        struct ChatChoice {
            message: ChatMessageResponse,
        }

        #[derive(Deserialize)]
        struct ChatMessageResponse {
            content: String,
        }

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: EXTRACTION_TEMPERATURE,
            max_tokens: EXTRACTION_MAX_TOKENS,
        };

        let url = format!("{}/chat/completions", self.config.base_url);

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
            .map_err(|e| ExtractError::Provider(e.to_string()))?;

        if response.status() == 429 {
            return Err(ExtractError::RateLimited);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::Provider(format!("HTTP {}: {}", status, body)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::Provider(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ExtractError::Parse("no choices in response".to_string()))
    }
}

#[async_trait]
impl FieldExtractor for ApiExtractor {
    fn id(&self) -> &str {
        &self.id
    }

    async fn extract(&self, document_text: &str) -> Result<ExtractedFields, ExtractError> {
        let prompt = Self::build_prompt(document_text);
        let content = self.call_api(&prompt).await?;

        let value = extract_json_object(&content).ok_or_else(|| {
            ExtractError::Parse(format!(
                "no JSON object in response: {}",
                &content.chars().take(200).collect::<String>()
            ))
        })?;

        let fields: ExtractedFields = serde_json::from_value(value)
            .map_err(|e| ExtractError::Parse(e.to_string()))?;

        if fields.vendor.trim().is_empty() || fields.total_amount <= 0.0 {
            return Err(ExtractError::Parse(
                "response missing vendor or positive amount".to_string(),
            ));
        }

        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_document_and_categories() {
        let prompt = ApiExtractor::build_prompt("ACME invoice text");
        assert!(prompt.contains("ACME invoice text"));
        for category in INVOICE_CATEGORIES {
            assert!(prompt.contains(category), "missing category {}", category);
        }
    }

    #[test]
    fn test_extractor_id_includes_model() {
        let extractor =
            ApiExtractor::new(ApiExtractorConfig::new("https://api.example.com/v1", "m1", "key"))
                .unwrap();
        assert_eq!(extractor.id(), "api:m1");
    }
}
