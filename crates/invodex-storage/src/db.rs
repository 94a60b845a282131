//! RocksDB wrapper for Invodex storage.
//!
//! Provides:
//! - Database open with column family setup
//! - Insert-if-absent parse-cache writes (keep-first merge)
//! - Atomic record + hash-pointer + outbox writes
//! - Lost-update-free vendor aggregate upserts (associative merge)

use rocksdb::{ColumnFamily, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use tracing::{debug, info};

use invodex_types::{CacheEntry, EmbeddingStatus, InvoiceRecord, Vendor};

use crate::column_families::{
    build_cf_descriptors, CF_EMBED_CACHE, CF_EMBED_OUTBOX, CF_PARSE_CACHE, CF_RECORDS,
    CF_RECORDS_BY_HASH, CF_VENDORS,
};
use crate::error::StorageError;
use crate::keys::parse_cache_key;

/// Main storage interface for Invodex
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    // ---- parse cache -------------------------------------------------

    /// Look up a cached extraction result by content hash.
    pub fn cache_lookup(&self, content_hash: &str) -> Result<Option<CacheEntry>, StorageError> {
        let cf = self.cf(CF_PARSE_CACHE)?;
        match self.db.get_cf(cf, parse_cache_key(content_hash))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Store an extraction result for a content hash, unless one exists.
    ///
    /// Returns the canonical entry: the caller's if it won the race, the
    /// earlier winner's otherwise. The losing computation is simply
    /// discarded, which is not an error.
    pub fn cache_store_if_absent(
        &self,
        content_hash: &str,
        entry: &CacheEntry,
    ) -> Result<CacheEntry, StorageError> {
        let cf = self.cf(CF_PARSE_CACHE)?;
        let key = parse_cache_key(content_hash);
        self.db.merge_cf(cf, &key, serde_json::to_vec(entry)?)?;

        let winner = self
            .db
            .get_cf(cf, &key)?
            .ok_or_else(|| StorageError::NotFound(format!("cache entry {}", content_hash)))?;
        let winner: CacheEntry = serde_json::from_slice(&winner)?;
        debug!(hash = content_hash, method = winner.method.as_str(), "Parse cache settled");
        Ok(winner)
    }

    // ---- records -----------------------------------------------------

    /// Persist a record and enqueue it for embedding, atomically.
    pub fn put_record(&self, record: &InvoiceRecord) -> Result<(), StorageError> {
        let records_cf = self.cf(CF_RECORDS)?;
        let outbox_cf = self.cf(CF_EMBED_OUTBOX)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(records_cf, record.id.as_bytes(), serde_json::to_vec(record)?);
        if record.embedding == EmbeddingStatus::Pending {
            batch.put_cf(outbox_cf, record.id.as_bytes(), b"");
        }
        self.db.write(batch)?;

        debug!(id = %record.id, vendor = %record.vendor_id, "Stored record");
        Ok(())
    }

    /// Get a record by id.
    pub fn get_record(&self, id: &str) -> Result<Option<InvoiceRecord>, StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete a record (used to discard the loser of a duplicate-submit race).
    pub fn delete_record(&self, id: &str) -> Result<(), StorageError> {
        let records_cf = self.cf(CF_RECORDS)?;
        let outbox_cf = self.cf(CF_EMBED_OUTBOX)?;
        let mut batch = WriteBatch::default();
        batch.delete_cf(records_cf, id.as_bytes());
        batch.delete_cf(outbox_cf, id.as_bytes());
        self.db.write(batch)?;
        Ok(())
    }

    /// Record id already claimed for a content hash, if any.
    pub fn record_id_for_hash(&self, content_hash: &str) -> Result<Option<String>, StorageError> {
        let cf = self.cf(CF_RECORDS_BY_HASH)?;
        match self.db.get_cf(cf, content_hash.as_bytes())? {
            Some(bytes) => Ok(Some(
                String::from_utf8(bytes).map_err(|e| StorageError::Key(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// Claim a content hash for a record id; first claim wins.
    ///
    /// Returns the winning record id. A caller whose id lost should delete
    /// its freshly written record and use the winner.
    pub fn claim_record_for_hash(
        &self,
        content_hash: &str,
        record_id: &str,
    ) -> Result<String, StorageError> {
        let cf = self.cf(CF_RECORDS_BY_HASH)?;
        self.db
            .merge_cf(cf, content_hash.as_bytes(), record_id.as_bytes())?;
        self.record_id_for_hash(content_hash)?
            .ok_or_else(|| StorageError::NotFound(format!("hash claim {}", content_hash)))
    }

    /// Iterate all records. Used by index rebuilds and listings.
    pub fn list_records(&self) -> Result<Vec<InvoiceRecord>, StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    /// Update a record's embedding status, clearing the outbox entry when
    /// the embedding is ready.
    pub fn set_embedding_status(
        &self,
        id: &str,
        status: EmbeddingStatus,
    ) -> Result<(), StorageError> {
        let mut record = self
            .get_record(id)?
            .ok_or_else(|| StorageError::NotFound(format!("record {}", id)))?;
        record.embedding = status;

        let records_cf = self.cf(CF_RECORDS)?;
        let outbox_cf = self.cf(CF_EMBED_OUTBOX)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(records_cf, id.as_bytes(), serde_json::to_vec(&record)?);
        match record.embedding {
            EmbeddingStatus::Ready { .. } => batch.delete_cf(outbox_cf, id.as_bytes()),
            EmbeddingStatus::Pending => batch.put_cf(outbox_cf, id.as_bytes(), b""),
        }
        self.db.write(batch)?;
        Ok(())
    }

    // ---- vendors -----------------------------------------------------

    /// Fold a seed vendor into the stored vendor under its id.
    ///
    /// This is the only write path for vendors; the merge operator makes
    /// concurrent upserts for the same vendor both land.
    pub fn merge_vendor_seed(&self, seed: &Vendor) -> Result<(), StorageError> {
        let cf = self.cf(CF_VENDORS)?;
        self.db
            .merge_cf(cf, seed.id.as_bytes(), serde_json::to_vec(seed)?)?;
        Ok(())
    }

    /// Get a vendor by canonical id.
    pub fn get_vendor(&self, id: &str) -> Result<Option<Vendor>, StorageError> {
        let cf = self.cf(CF_VENDORS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All known vendors.
    pub fn list_vendors(&self) -> Result<Vec<Vendor>, StorageError> {
        let cf = self.cf(CF_VENDORS)?;
        let mut vendors = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            vendors.push(serde_json::from_slice(&value)?);
        }
        Ok(vendors)
    }

    // ---- embedding cache ---------------------------------------------

    pub fn embed_cache_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(CF_EMBED_CACHE)?;
        Ok(self.db.get_cf(cf, key)?)
    }

    pub fn embed_cache_put(&self, key: &[u8], vector_bytes: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(CF_EMBED_CACHE)?;
        self.db.put_cf(cf, key, vector_bytes)?;
        Ok(())
    }

    // ---- pending-embedding outbox ------------------------------------

    /// Record ids still awaiting an embedding, oldest first.
    pub fn pending_embeddings(&self, limit: usize) -> Result<Vec<String>, StorageError> {
        let cf = self.cf(CF_EMBED_OUTBOX)?;
        let mut ids = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            if ids.len() >= limit {
                break;
            }
            let (key, _) = item?;
            ids.push(
                String::from_utf8(key.to_vec()).map_err(|e| StorageError::Key(e.to_string()))?,
            );
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use invodex_types::{ExtractedFields, ExtractionMethod};
    use tempfile::TempDir;

    fn fields(vendor: &str, amount: f64) -> ExtractedFields {
        ExtractedFields {
            vendor: vendor.to_string(),
            document_number: None,
            date: None,
            total_amount: amount,
            currency: "USD".to_string(),
            category: "Other".to_string(),
            purchaser: None,
            is_recurring: false,
            line_items: vec![],
        }
    }

    fn entry(vendor: &str, amount: f64, confidence: f32) -> CacheEntry {
        CacheEntry {
            fields: fields(vendor, amount),
            method: ExtractionMethod::Template,
            confidence,
            computed_at: Utc::now(),
        }
    }

    fn record(id: &str, hash: &str) -> InvoiceRecord {
        InvoiceRecord {
            id: id.to_string(),
            vendor_name: "Acme Inc".to_string(),
            vendor_id: "acme".to_string(),
            document_number: Some("INV-1".to_string()),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            total_amount: 120.0,
            currency: "USD".to_string(),
            category: "Other".to_string(),
            purchaser: None,
            is_recurring: false,
            line_items: vec![],
            confidence: 0.95,
            method: ExtractionMethod::Template,
            review: vec![],
            embedding: EmbeddingStatus::Pending,
            content_hash: hash.to_string(),
            parsed_at: Utc::now(),
        }
    }

    #[test]
    fn test_cache_first_writer_wins() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::open(temp.path()).unwrap();

        let first = storage
            .cache_store_if_absent("hash1", &entry("Acme", 100.0, 0.95))
            .unwrap();
        assert_eq!(first.fields.vendor, "Acme");

        // A later computation for the same bytes is discarded.
        let settled = storage
            .cache_store_if_absent("hash1", &entry("Acme Corp", 999.0, 0.5))
            .unwrap();
        assert_eq!(settled.fields.vendor, "Acme");
        assert_eq!(settled.fields.total_amount, 100.0);

        let lookup = storage.cache_lookup("hash1").unwrap().unwrap();
        assert_eq!(lookup.fields.total_amount, 100.0);
    }

    #[test]
    fn test_cache_miss_is_none() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::open(temp.path()).unwrap();
        assert!(storage.cache_lookup("missing").unwrap().is_none());
    }

    #[test]
    fn test_record_roundtrip_and_outbox() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::open(temp.path()).unwrap();

        let rec = record("01ARZ3NDEKTSV4RRFFQ69G5FAV", "hashA");
        storage.put_record(&rec).unwrap();

        let loaded = storage.get_record(&rec.id).unwrap().unwrap();
        assert_eq!(loaded.vendor_name, "Acme Inc");

        // Pending record is queued for embedding.
        let pending = storage.pending_embeddings(10).unwrap();
        assert_eq!(pending, vec![rec.id.clone()]);

        // Marking ready clears the queue.
        storage
            .set_embedding_status(
                &rec.id,
                EmbeddingStatus::Ready {
                    provider_id: "bge-local".to_string(),
                },
            )
            .unwrap();
        assert!(storage.pending_embeddings(10).unwrap().is_empty());
    }

    #[test]
    fn test_hash_claim_first_wins() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::open(temp.path()).unwrap();

        let winner = storage.claim_record_for_hash("hashX", "id-one").unwrap();
        assert_eq!(winner, "id-one");

        let second = storage.claim_record_for_hash("hashX", "id-two").unwrap();
        assert_eq!(second, "id-one");
    }

    #[test]
    fn test_vendor_merge_accumulates() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::open(temp.path()).unwrap();

        let d1 = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 4, 2).unwrap();

        storage
            .merge_vendor_seed(&Vendor::seed("Acme", "ACME INC", 100.0, d1, None))
            .unwrap();
        storage
            .merge_vendor_seed(&Vendor::seed("Acme", "Acme Corp.", 50.0, d2, None))
            .unwrap();

        let vendor = storage.get_vendor("acme").unwrap().unwrap();
        assert_eq!(vendor.total_spent, 150.0);
        assert_eq!(vendor.record_count, 2);
        assert_eq!(vendor.first_seen, d1);
        assert_eq!(vendor.last_seen, d2);
        assert_eq!(vendor.aliases.len(), 2);
    }

    #[test]
    fn test_vendor_merge_concurrent_threads() {
        use std::sync::Arc;

        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let date = NaiveDate::from_ymd_opt(2025, 2, 2).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let storage = storage.clone();
                std::thread::spawn(move || {
                    let seed =
                        Vendor::seed("Acme", format!("alias-{}", i), 10.0, date, None);
                    storage.merge_vendor_seed(&seed).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let vendor = storage.get_vendor("acme").unwrap().unwrap();
        assert_eq!(vendor.record_count, 8);
        assert!((vendor.total_spent - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_embed_cache_roundtrip() {
        let temp = TempDir::new().unwrap();
        let storage = Storage::open(temp.path()).unwrap();

        let key = crate::keys::embed_cache_key("texthash", "bge-local", "document");
        assert!(storage.embed_cache_get(&key).unwrap().is_none());

        storage.embed_cache_put(&key, &[1, 2, 3, 4]).unwrap();
        assert_eq!(storage.embed_cache_get(&key).unwrap().unwrap(), vec![1, 2, 3, 4]);
    }
}
