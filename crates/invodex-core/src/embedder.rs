//! Record embedding: canonical text -> cache -> provider chain -> vector
//! store.

use std::sync::Arc;

use tracing::{debug, info, warn};

use invodex_embeddings::{
    canonical_text, text_hash, Embedding, EmbeddingCache, EncodeMode, ProviderChain,
};
use invodex_storage::{embed_cache_key, Storage};
use invodex_types::{EmbeddingStatus, InvoiceRecord};
use invodex_vector::VectorStore;

use crate::error::CoreError;

/// RocksDB-backed embedding cache. Best-effort: storage failures degrade to
/// a miss or a dropped write, never an error.
pub struct StorageEmbeddingCache {
    storage: Arc<Storage>,
}

impl StorageEmbeddingCache {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl EmbeddingCache for StorageEmbeddingCache {
    fn get(&self, text_hash: &str, provider_id: &str, mode: EncodeMode) -> Option<Embedding> {
        let key = embed_cache_key(text_hash, provider_id, mode.as_str());
        match self.storage.embed_cache_get(&key) {
            Ok(Some(bytes)) if bytes.len() % 4 == 0 => {
                Embedding::from_le_bytes(&bytes, bytes.len() / 4).ok()
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Embedding cache read failed");
                None
            }
        }
    }

    fn put(&self, text_hash: &str, provider_id: &str, mode: EncodeMode, embedding: &Embedding) {
        let key = embed_cache_key(text_hash, provider_id, mode.as_str());
        if let Err(e) = self.storage.embed_cache_put(&key, &embedding.to_le_bytes()) {
            warn!(error = %e, "Embedding cache write failed");
        }
    }
}

/// Generates and indexes embeddings for invoice records.
pub struct RecordEmbedder {
    chain: ProviderChain,
    cache: Arc<dyn EmbeddingCache>,
    storage: Arc<Storage>,
    vectors: Arc<VectorStore>,
}

impl RecordEmbedder {
    pub fn new(
        chain: ProviderChain,
        cache: Arc<dyn EmbeddingCache>,
        storage: Arc<Storage>,
        vectors: Arc<VectorStore>,
    ) -> Self {
        Self {
            chain,
            cache,
            storage,
            vectors,
        }
    }

    /// Id of the provider queries must be encoded with.
    pub fn primary_provider_id(&self) -> &str {
        self.chain.primary_id()
    }

    /// Encode text, consulting the cache for the primary provider first.
    ///
    /// Returns the embedding and the id of the provider that produced it.
    /// Fallback-produced vectors are tagged with the fallback's id and are
    /// only comparable within that provider's partition.
    pub async fn encode(
        &self,
        text: &str,
        mode: EncodeMode,
    ) -> Result<(String, Embedding), CoreError> {
        let hash = text_hash(text);
        let primary = self.chain.primary_id().to_string();

        if let Some(cached) = self.cache.get(&hash, &primary, mode) {
            debug!(provider = %primary, mode = mode.as_str(), "Embedding cache hit");
            return Ok((primary, cached));
        }

        let report = self.chain.encode(text, mode).await?;
        self.cache
            .put(&hash, &report.provider_id, mode, &report.embedding);
        Ok((report.provider_id, report.embedding))
    }

    /// Generate (or re-generate) a record's document embedding, insert it
    /// into the vector store, and mark the record ready.
    ///
    /// Returns the id of the provider that produced the vector.
    pub async fn embed_record(&self, record: &InvoiceRecord) -> Result<String, CoreError> {
        let text = canonical_text(record);
        let (provider_id, embedding) = self.encode(&text, EncodeMode::Document).await?;

        self.vectors.insert(&provider_id, &record.id, &embedding)?;
        self.storage.set_embedding_status(
            &record.id,
            EmbeddingStatus::Ready {
                provider_id: provider_id.clone(),
            },
        )?;

        info!(record = %record.id, provider = %provider_id, "Embedded record");
        Ok(provider_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    use invodex_embeddings::{EmbeddingError, EmbeddingProvider};
    use invodex_vector::{DistanceMetric, VectorStoreConfig};

    /// Counting bag-of-words provider for tests.
    struct CountingProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn id(&self) -> &str {
            "counting"
        }

        fn dimension(&self) -> usize {
            16
        }

        async fn encode(
            &self,
            text: &str,
            mode: EncodeMode,
        ) -> Result<Embedding, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut values = vec![0.0f32; 16];
            let prefixed = match mode {
                EncodeMode::Document => text.to_string(),
                EncodeMode::Query => format!("query: {}", text),
            };
            for token in prefixed.split_whitespace() {
                let mut h = 0usize;
                for b in token.bytes() {
                    h = h.wrapping_mul(31).wrapping_add(b as usize);
                }
                values[h % 16] += 1.0;
            }
            Ok(Embedding::new(values))
        }

        async fn health_check(&self) -> Result<(), EmbeddingError> {
            Ok(())
        }
    }

    fn setup(temp: &TempDir) -> (RecordEmbedder, Arc<Storage>, Arc<AtomicUsize>) {
        let storage = Arc::new(Storage::open(&temp.path().join("db")).unwrap());
        let vectors = Arc::new(
            VectorStore::open(VectorStoreConfig::new(
                temp.path().join("vectors"),
                DistanceMetric::Cosine,
            ))
            .unwrap(),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = ProviderChain::new(Arc::new(CountingProvider {
            calls: calls.clone(),
        }));
        let cache = Arc::new(StorageEmbeddingCache::new(storage.clone()));
        (
            RecordEmbedder::new(chain, cache, storage.clone(), vectors),
            storage,
            calls,
        )
    }

    #[tokio::test]
    async fn test_encode_caches_per_mode() {
        let temp = TempDir::new().unwrap();
        let (embedder, _storage, calls) = setup(&temp);

        let (p1, e1) = embedder.encode("cloud costs", EncodeMode::Document).await.unwrap();
        let (p2, e2) = embedder.encode("cloud costs", EncodeMode::Document).await.unwrap();
        assert_eq!(p1, p2);
        assert_eq!(e1, e2);
        // Second call is a cache hit.
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Query mode is a different cache entry and a different vector.
        let (_, q) = embedder.encode("cloud costs", EncodeMode::Query).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_ne!(q, e1);
    }

    #[tokio::test]
    async fn test_embed_record_marks_ready() {
        use chrono::{NaiveDate, Utc};
        use invodex_types::ExtractionMethod;

        let temp = TempDir::new().unwrap();
        let (embedder, storage, _calls) = setup(&temp);

        let record = InvoiceRecord {
            id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
            vendor_name: "Acme".to_string(),
            vendor_id: "acme".to_string(),
            document_number: None,
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            total_amount: 10.0,
            currency: "USD".to_string(),
            category: "Other".to_string(),
            purchaser: None,
            is_recurring: false,
            line_items: vec![],
            confidence: 0.9,
            method: ExtractionMethod::Template,
            review: vec![],
            embedding: EmbeddingStatus::Pending,
            content_hash: "h".to_string(),
            parsed_at: Utc::now(),
        };
        storage.put_record(&record).unwrap();

        let provider = embedder.embed_record(&record).await.unwrap();
        assert_eq!(provider, "counting");

        let stored = storage.get_record(&record.id).unwrap().unwrap();
        assert_eq!(
            stored.embedding,
            EmbeddingStatus::Ready {
                provider_id: "counting".to_string()
            }
        );
        assert!(storage.pending_embeddings(10).unwrap().is_empty());
    }
}
