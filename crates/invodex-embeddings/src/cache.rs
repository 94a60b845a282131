//! Embedding cache interface.
//!
//! Keyed by (canonical-text hash, provider id, mode): the same text encodes
//! differently per provider and per mode, so all three participate in the
//! key. A hit skips the provider entirely. Caching is best-effort; a failed
//! store must not fail the encode.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::embedding::Embedding;
use crate::provider::EncodeMode;

/// Cache for encoded vectors.
pub trait EmbeddingCache: Send + Sync {
    fn get(&self, text_hash: &str, provider_id: &str, mode: EncodeMode) -> Option<Embedding>;

    fn put(&self, text_hash: &str, provider_id: &str, mode: EncodeMode, embedding: &Embedding);
}

/// In-memory cache used in tests and small deployments. The persistent
/// RocksDB-backed cache lives in invodex-core.
#[derive(Default)]
pub struct MemoryEmbeddingCache {
    entries: Mutex<HashMap<(String, String, EncodeMode), Embedding>>,
}

impl MemoryEmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EmbeddingCache for MemoryEmbeddingCache {
    fn get(&self, text_hash: &str, provider_id: &str, mode: EncodeMode) -> Option<Embedding> {
        self.entries
            .lock()
            .ok()?
            .get(&(text_hash.to_string(), provider_id.to_string(), mode))
            .cloned()
    }

    fn put(&self, text_hash: &str, provider_id: &str, mode: EncodeMode, embedding: &Embedding) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                (text_hash.to_string(), provider_id.to_string(), mode),
                embedding.clone(),
            );
        }
    }
}
