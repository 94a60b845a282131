//! The Invodex service: boundary operations over the assembled subsystems.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use ulid::Ulid;

use invodex_embeddings::{EncodeMode, ProviderChain};
use invodex_extract::{
    parse_date, validate_fields, ExtractionPipeline, FieldExtractor, Outcome, TemplateStore,
};
use invodex_storage::Storage;
use invodex_types::{
    CacheEntry, EmbeddingStatus, ExtractionMethod, InvoiceRecord, ReviewReason, Settings, Vendor,
};
use invodex_vector::{DistanceMetric, SimilarityResult, VectorStore, VectorStoreConfig};
use invodex_vendors::VendorRegistry;

use crate::embedder::{RecordEmbedder, StorageEmbeddingCache};
use crate::error::CoreError;
use crate::hash::content_hash;

/// What a submission produced.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    pub record_id: String,
    /// True when the extraction came from the parse cache or the document
    /// was a byte-identical resubmission; no extractor ran.
    pub cache_hit: bool,
    pub method: ExtractionMethod,
    pub confidence: f32,
    pub vendor_id: String,
    /// False when embedding was deferred (provider chain exhausted); the
    /// maintenance job retries it.
    pub embedded: bool,
}

/// The assembled Invodex service.
pub struct Invodex {
    settings: Settings,
    storage: Arc<Storage>,
    pipeline: ExtractionPipeline,
    vendors: VendorRegistry,
    vectors: Arc<VectorStore>,
    embedder: RecordEmbedder,
}

impl Invodex {
    /// Assemble the service from settings plus the externally constructed
    /// collaborators (embedding chain, optional generative extractor).
    pub fn new(
        settings: Settings,
        chain: ProviderChain,
        extractor: Option<Arc<dyn FieldExtractor>>,
    ) -> Result<Self, CoreError> {
        settings
            .validate()
            .map_err(|e| CoreError::Config(e.to_string()))?;

        let storage = Arc::new(Storage::open(Path::new(&settings.db_path))?);
        let templates = Arc::new(TemplateStore::open(settings.template_dir_path())?);

        let mut pipeline = ExtractionPipeline::new(
            templates,
            settings.extraction.template_confidence_threshold,
        );
        if let Some(extractor) = extractor {
            pipeline = pipeline.with_generative(extractor);
        }

        let metric = DistanceMetric::parse(&settings.index.metric)?;
        let mut vector_config = VectorStoreConfig::new(Self::vector_path(&settings), metric);
        vector_config.connectivity = settings.index.connectivity;
        vector_config.expansion_add = settings.index.expansion_add;
        vector_config.expansion_search = settings.index.expansion_search;
        let vectors = Arc::new(VectorStore::open(vector_config)?);

        let vendors = VendorRegistry::new(storage.clone(), &settings.vendors);
        let cache = Arc::new(StorageEmbeddingCache::new(storage.clone()));
        let embedder = RecordEmbedder::new(chain, cache, storage.clone(), vectors.clone());

        Ok(Self {
            settings,
            storage,
            pipeline,
            vendors,
            vectors,
            embedder,
        })
    }

    fn vector_path(settings: &Settings) -> PathBuf {
        PathBuf::from(&settings.db_path)
            .parent()
            .map(|p| p.join("vectors"))
            .unwrap_or_else(|| PathBuf::from("./vectors"))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Submit a document. Idempotent per content hash: byte-identical
    /// resubmissions reuse the persisted record and run no extractor.
    ///
    /// Embedding failure never fails the submission; the record persists
    /// with a pending embedding and becomes searchable once the maintenance
    /// job succeeds.
    pub async fn submit(&self, bytes: &[u8]) -> Result<SubmitReceipt, CoreError> {
        let hash = content_hash(bytes);

        if let Some(existing) = self.storage.record_id_for_hash(&hash)? {
            return self.receipt_for_existing(&existing, &hash);
        }

        // Parse-cache gate: at most one persisted extraction per hash.
        let (entry, cache_hit) = match self.storage.cache_lookup(&hash)? {
            Some(entry) => {
                info!(hash = %hash, "Parse cache hit");
                (entry, true)
            }
            None => {
                let report = self.pipeline.run(bytes).await;
                match report.outcome {
                    Outcome::Accepted {
                        fields,
                        method,
                        confidence,
                        ..
                    } => {
                        let entry = CacheEntry {
                            fields,
                            method,
                            confidence,
                            computed_at: Utc::now(),
                        };
                        // Insert-if-absent: if a concurrent duplicate won,
                        // our computation is discarded and theirs is
                        // canonical from here on.
                        let canonical = self.storage.cache_store_if_absent(&hash, &entry)?;
                        (canonical, false)
                    }
                    Outcome::Rejected(reason) => return Err(CoreError::Rejected(reason)),
                }
            }
        };

        // Claim the hash before any side effects, so a duplicate-submit
        // race cannot double-count vendor aggregates.
        let record_id = Ulid::new().to_string();
        let winner = self.storage.claim_record_for_hash(&hash, &record_id)?;
        if winner != record_id {
            return self.receipt_for_existing(&winner, &hash);
        }

        let record = self.build_record(record_id, &hash, &entry)?;
        self.storage.put_record(&record)?;

        let embedded = match self.embedder.embed_record(&record).await {
            Ok(_) => true,
            Err(e) => {
                warn!(record = %record.id, error = %e, "Embedding deferred; record persisted as pending");
                false
            }
        };

        info!(
            record = %record.id,
            vendor = %record.vendor_id,
            method = record.method.as_str(),
            cache_hit = cache_hit,
            "Submission complete"
        );

        Ok(SubmitReceipt {
            record_id: record.id,
            cache_hit,
            method: record.method,
            confidence: record.confidence,
            vendor_id: record.vendor_id,
            embedded,
        })
    }

    /// Receipt for a hash that already has a canonical record.
    fn receipt_for_existing(&self, record_id: &str, hash: &str) -> Result<SubmitReceipt, CoreError> {
        let record = self
            .storage
            .get_record(record_id)?
            .ok_or_else(|| CoreError::NotFound(record_id.to_string()))?;

        info!(record = %record.id, hash = %hash, "Duplicate submission, reusing record");
        Ok(SubmitReceipt {
            record_id: record.id.clone(),
            cache_hit: true,
            method: record.method,
            confidence: record.confidence,
            vendor_id: record.vendor_id.clone(),
            embedded: matches!(record.embedding, EmbeddingStatus::Ready { .. }),
        })
    }

    /// Build a validated record from a (possibly cached) extraction entry.
    fn build_record(
        &self,
        id: String,
        hash: &str,
        entry: &CacheEntry,
    ) -> Result<InvoiceRecord, CoreError> {
        let fields = &entry.fields;
        let mut review = validate_fields(fields).review;

        let date = fields
            .date
            .as_deref()
            .and_then(parse_date)
            .unwrap_or_else(|| Utc::now().date_naive());

        let vendor = self
            .vendors
            .record(&fields.vendor, fields.total_amount, date)?;

        let confidence = entry.confidence;
        let threshold = self.settings.extraction.template_confidence_threshold;
        if confidence < threshold
            && !review
                .iter()
                .any(|r| matches!(r, ReviewReason::LowConfidence { .. }))
        {
            review.push(ReviewReason::LowConfidence { confidence });
        }

        Ok(InvoiceRecord {
            id,
            vendor_name: fields.vendor.clone(),
            vendor_id: vendor.id,
            document_number: fields.document_number.clone(),
            date,
            total_amount: fields.total_amount,
            currency: fields.currency.clone(),
            category: fields.category.clone(),
            purchaser: fields.purchaser.clone(),
            is_recurring: fields.is_recurring,
            line_items: fields.line_items.clone(),
            confidence,
            method: entry.method,
            review,
            embedding: EmbeddingStatus::Pending,
            content_hash: hash.to_string(),
            parsed_at: Utc::now(),
        })
    }

    /// Natural-language similarity query: encode in query mode, search the
    /// encoding provider's partition.
    pub async fn semantic_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<SimilarityResult, CoreError> {
        let (provider_id, embedding) = self.embedder.encode(query, EncodeMode::Query).await?;
        Ok(self.vectors.search(&provider_id, &embedding, limit, None)?)
    }

    /// Similar-to-record query: reuse the stored document vector, excluding
    /// the record itself from the results.
    pub async fn find_similar(
        &self,
        record_id: &str,
        limit: usize,
    ) -> Result<SimilarityResult, CoreError> {
        let record = self
            .storage
            .get_record(record_id)?
            .ok_or_else(|| CoreError::NotFound(record_id.to_string()))?;

        let EmbeddingStatus::Ready { provider_id } = &record.embedding else {
            return Err(CoreError::EmbeddingPending(record_id.to_string()));
        };

        let vector = self
            .vectors
            .get(provider_id, record_id)?
            .ok_or_else(|| CoreError::NotFound(format!("vector for {}", record_id)))?;

        Ok(self
            .vectors
            .search(provider_id, &vector, limit, Some(record_id))?)
    }

    /// Retry embedding for records still pending, oldest first.
    ///
    /// Returns how many records became searchable.
    pub async fn retry_pending_embeddings(&self, batch: usize) -> Result<usize, CoreError> {
        let pending = self.storage.pending_embeddings(batch)?;
        let mut embedded = 0;

        for id in pending {
            let Some(record) = self.storage.get_record(&id)? else {
                continue;
            };
            match self.embedder.embed_record(&record).await {
                Ok(_) => embedded += 1,
                Err(e) => {
                    warn!(record = %id, error = %e, "Pending embedding retry failed");
                }
            }
        }

        Ok(embedded)
    }

    pub fn record(&self, id: &str) -> Result<Option<InvoiceRecord>, CoreError> {
        Ok(self.storage.get_record(id)?)
    }

    pub fn records(&self) -> Result<Vec<InvoiceRecord>, CoreError> {
        Ok(self.storage.list_records()?)
    }

    pub fn vendors(&self) -> Result<Vec<Vendor>, CoreError> {
        Ok(self.storage.list_vendors()?)
    }

    /// The vector store, for maintenance and stats.
    pub fn vector_store(&self) -> &Arc<VectorStore> {
        &self.vectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    use invodex_embeddings::{Embedding, EmbeddingError, EmbeddingProvider};
    use invodex_types::RejectReason;

    const AWS_INVOICE: &[u8] = b"Amazon Web Services\n\
        Invoice Number: 1065-2025\n\
        Invoice Date: 06/01/2025\n\
        Total Due: $120.00\n";

    /// Deterministic token-hash provider with a query prefix.
    struct HashProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbeddingProvider for HashProvider {
        fn id(&self) -> &str {
            "hash-test"
        }

        fn dimension(&self) -> usize {
            64
        }

        async fn encode(
            &self,
            text: &str,
            mode: EncodeMode,
        ) -> Result<Embedding, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let prefixed = match mode {
                EncodeMode::Document => text.to_lowercase(),
                EncodeMode::Query => format!("query: {}", text.to_lowercase()),
            };
            let mut values = vec![0.0f32; 64];
            for token in prefixed.split(|c: char| !c.is_alphanumeric()) {
                if token.is_empty() {
                    continue;
                }
                let mut h = 7usize;
                for b in token.bytes() {
                    h = h.wrapping_mul(31).wrapping_add(b as usize);
                }
                values[h % 64] += 1.0;
            }
            Ok(Embedding::new(values))
        }

        async fn health_check(&self) -> Result<(), EmbeddingError> {
            Ok(())
        }
    }

    fn service(temp: &TempDir) -> (Invodex, Arc<AtomicUsize>) {
        let mut settings = Settings::default();
        settings.db_path = temp.path().join("db").to_string_lossy().to_string();
        settings.template_dir = Some(temp.path().join("templates").to_string_lossy().to_string());

        let calls = Arc::new(AtomicUsize::new(0));
        let chain = ProviderChain::new(Arc::new(HashProvider {
            calls: calls.clone(),
        }));
        (Invodex::new(settings, chain, None).unwrap(), calls)
    }

    #[tokio::test]
    async fn test_submit_persists_record_and_vendor() {
        let temp = TempDir::new().unwrap();
        let (service, _) = service(&temp);

        let receipt = service.submit(AWS_INVOICE).await.unwrap();
        assert!(!receipt.cache_hit);
        assert!(receipt.embedded);
        assert_eq!(receipt.method, ExtractionMethod::Template);
        assert_eq!(receipt.vendor_id, "amazon-web-services");

        let record = service.record(&receipt.record_id).unwrap().unwrap();
        assert_eq!(record.total_amount, 120.0);
        assert_eq!(record.document_number.as_deref(), Some("1065-2025"));

        let vendors = service.vendors().unwrap();
        assert_eq!(vendors.len(), 1);
        assert_eq!(vendors[0].record_count, 1);
    }

    #[tokio::test]
    async fn test_resubmission_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let (service, _) = service(&temp);

        let first = service.submit(AWS_INVOICE).await.unwrap();
        let second = service.submit(AWS_INVOICE).await.unwrap();

        assert_eq!(first.record_id, second.record_id);
        assert!(second.cache_hit);
        assert_eq!(first.confidence, second.confidence);

        // One record, one vendor contribution: aggregates not double-counted.
        assert_eq!(service.records().unwrap().len(), 1);
        assert_eq!(service.vendors().unwrap()[0].record_count, 1);
    }

    #[tokio::test]
    async fn test_unreadable_document_rejected() {
        let temp = TempDir::new().unwrap();
        let (service, _) = service(&temp);

        let err = service.submit(&[0xff, 0xfe]).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Rejected(RejectReason::Unreadable)
        ));
        assert!(service.records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_semantic_search_is_stable() {
        let temp = TempDir::new().unwrap();
        let (service, _) = service(&temp);

        service.submit(AWS_INVOICE).await.unwrap();
        service
            .submit(b"Amazon Web Services\nInvoice Number: 2001\nInvoice Date: 07/01/2025\nTotal Due: $87.00\n")
            .await
            .unwrap();

        let first = service.semantic_search("aws cloud invoice", 5).await.unwrap();
        let second = service.semantic_search("aws cloud invoice", 5).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_find_similar_excludes_self() {
        let temp = TempDir::new().unwrap();
        let (service, _) = service(&temp);

        let a = service.submit(AWS_INVOICE).await.unwrap();
        let b = service
            .submit(b"Amazon Web Services\nInvoice Number: 2001\nInvoice Date: 07/01/2025\nTotal Due: $87.00\n")
            .await
            .unwrap();

        let similar = service.find_similar(&a.record_id, 5).await.unwrap();
        assert!(!similar.iter().any(|h| h.record_id == a.record_id));
        assert!(similar.iter().any(|h| h.record_id == b.record_id));
    }

    #[tokio::test]
    async fn test_find_similar_unknown_record() {
        let temp = TempDir::new().unwrap();
        let (service, _) = service(&temp);

        let err = service.find_similar("01NOPE", 5).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
