//! Provider fallback chain.
//!
//! Tries the primary provider, then the configured secondary. The outcome is
//! explicit data - which provider produced the vector and what each failed
//! attempt said - rather than exception flow, so every terminal and
//! intermediate state is testable.

use std::sync::Arc;

use tracing::warn;

use crate::embedding::Embedding;
use crate::error::EmbeddingError;
use crate::provider::{EmbeddingProvider, EncodeMode};

/// One failed provider attempt within a chain encode.
#[derive(Debug, Clone)]
pub struct EncodeAttempt {
    pub provider_id: String,
    pub error: String,
}

/// Successful chain encode.
#[derive(Debug, Clone)]
pub struct EncodeReport {
    pub embedding: Embedding,
    /// Provider that actually produced the vector. Stored with the vector;
    /// never silently mixed with another provider's output.
    pub provider_id: String,
    pub mode: EncodeMode,
    /// Providers that failed before one succeeded.
    pub failed: Vec<EncodeAttempt>,
}

/// Ordered chain of embedding providers.
pub struct ProviderChain {
    providers: Vec<Arc<dyn EmbeddingProvider>>,
}

impl ProviderChain {
    pub fn new(primary: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            providers: vec![primary],
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn EmbeddingProvider>) -> Self {
        self.providers.push(fallback);
        self
    }

    /// Id of the primary provider. Queries must be encoded with the same
    /// provider as the corpus they search.
    pub fn primary_id(&self) -> &str {
        self.providers[0].id()
    }

    /// Dimension of the primary provider.
    pub fn primary_dimension(&self) -> usize {
        self.providers[0].dimension()
    }

    /// Encode with the first provider that succeeds.
    ///
    /// Each provider already applies its own bounded retry internally; the
    /// chain moves on once a provider is exhausted.
    pub async fn encode(
        &self,
        text: &str,
        mode: EncodeMode,
    ) -> Result<EncodeReport, EmbeddingError> {
        let mut failed = Vec::new();

        for provider in &self.providers {
            match provider.encode(text, mode).await {
                Ok(embedding) => {
                    return Ok(EncodeReport {
                        embedding,
                        provider_id: provider.id().to_string(),
                        mode,
                        failed,
                    });
                }
                Err(e) => {
                    warn!(provider = provider.id(), error = %e, "Provider failed, trying next");
                    failed.push(EncodeAttempt {
                        provider_id: provider.id().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let summary = failed
            .iter()
            .map(|a| format!("{}: {}", a.provider_id, a.error))
            .collect::<Vec<_>>()
            .join("; ");
        Err(EmbeddingError::Exhausted(summary))
    }
}
