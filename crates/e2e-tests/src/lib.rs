//! Shared test doubles for the cross-crate integration tests.
//!
//! The embedding provider is a deterministic token-hash bag-of-words model:
//! real enough that documents sharing vocabulary land near each other, and
//! fully reproducible so ranking assertions are stable. The extractor is
//! scripted per vendor keyword.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use invodex_core::Invodex;
use invodex_embeddings::{Embedding, EmbeddingError, EmbeddingProvider, EncodeMode, ProviderChain};
use invodex_extract::{ExtractError, FieldExtractor};
use invodex_types::{ExtractedFields, LineItem, Settings};

pub const MOCK_DIM: usize = 256;

/// Prefix the mock provider applies in query mode, making query and
/// document encodings of the same text intentionally different.
pub const MOCK_QUERY_PREFIX: &str = "query: ";

fn token_dim(token: &str) -> usize {
    let mut h: u64 = 7;
    for b in token.bytes() {
        h = h.wrapping_mul(31).wrapping_add(b as u64);
    }
    (h % MOCK_DIM as u64) as usize
}

/// Deterministic bag-of-words embedding provider.
pub struct TokenHashProvider {
    id: String,
    pub calls: AtomicUsize,
    pub unavailable: AtomicBool,
}

impl TokenHashProvider {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            calls: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// The encoding itself, exposed for direct assertions.
    pub fn embed_text(text: &str, mode: EncodeMode) -> Embedding {
        let prefixed = match mode {
            EncodeMode::Document => text.to_lowercase(),
            EncodeMode::Query => format!("{}{}", MOCK_QUERY_PREFIX, text).to_lowercase(),
        };
        let mut values = vec![0.0f32; MOCK_DIM];
        for token in prefixed.split(|c: char| !c.is_ascii_alphanumeric()) {
            if !token.is_empty() {
                values[token_dim(token)] += 1.0;
            }
        }
        Embedding::new(values)
    }
}

#[async_trait]
impl EmbeddingProvider for TokenHashProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn dimension(&self) -> usize {
        MOCK_DIM
    }

    async fn encode(&self, text: &str, mode: EncodeMode) -> Result<Embedding, EmbeddingError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Api("provider offline".to_string()));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::embed_text(text, mode))
    }

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(EmbeddingError::Api("provider offline".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Scripted generative extractor: the first script whose needle appears in
/// the document text wins. Counts calls so tests can assert the cache and
/// template stages actually short-circuit it.
pub struct ScriptedExtractor {
    scripts: Vec<(String, ExtractedFields)>,
    pub calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn new(scripts: Vec<(&str, ExtractedFields)>) -> Self {
        Self {
            scripts: scripts
                .into_iter()
                .map(|(needle, fields)| (needle.to_string(), fields))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FieldExtractor for ScriptedExtractor {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn extract(&self, document_text: &str) -> Result<ExtractedFields, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.scripts
            .iter()
            .find(|(needle, _)| document_text.contains(needle.as_str()))
            .map(|(_, fields)| fields.clone())
            .ok_or_else(|| ExtractError::Parse("no script for document".to_string()))
    }
}

/// Field-set builder for scripted extractions.
pub fn fields(
    vendor: &str,
    number: &str,
    date: &str,
    amount: f64,
    category: &str,
    recurring: bool,
) -> ExtractedFields {
    ExtractedFields {
        vendor: vendor.to_string(),
        document_number: Some(number.to_string()),
        date: Some(date.to_string()),
        total_amount: amount,
        currency: "USD".to_string(),
        category: category.to_string(),
        purchaser: None,
        is_recurring: recurring,
        line_items: vec![],
    }
}

/// Convenience line item.
pub fn line_item(description: &str, total: f64) -> LineItem {
    LineItem {
        description: description.to_string(),
        quantity: None,
        unit_price: None,
        total,
    }
}

/// Settings rooted in a temp dir.
pub fn test_settings(temp: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.db_path = temp.path().join("db").to_string_lossy().to_string();
    settings.template_dir = Some(temp.path().join("templates").to_string_lossy().to_string());
    settings
}

/// Assemble a service over the mock provider and scripted extractor.
pub fn build_service(
    temp: &TempDir,
    provider: Arc<TokenHashProvider>,
    extractor: Option<Arc<ScriptedExtractor>>,
) -> Invodex {
    let chain = ProviderChain::new(provider);
    let extractor = extractor.map(|e| e as Arc<dyn FieldExtractor>);
    Invodex::new(test_settings(temp), chain, extractor).unwrap()
}
