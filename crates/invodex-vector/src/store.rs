//! Persisted vector store with derived ANN indexes.
//!
//! RocksDB layout:
//! - vectors:       "{provider}\0{record_id}" -> little-endian f32 bytes
//! - vector_keys:   "{provider}\0{record_id}" -> u64 ANN key (big-endian)
//! - vector_meta:   u64 ANN key (big-endian)  -> { provider_id, record_id }
//! - provider_dims: "{provider}"              -> declared dimension
//!
//! Inserts write RocksDB and the live index for the provider; no
//! cross-record locking. Rebuilds construct a fresh index off to the side
//! and swap it in, so reads and writes continue against the old index while
//! a rebuild runs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use invodex_embeddings::Embedding;

use crate::error::VectorError;
use crate::hnsw::{HnswConfig, HnswIndex};
use crate::index::{IndexStats, SearchHit, SimilarityResult};
use crate::metric::DistanceMetric;

const CF_VECTORS: &str = "vectors";
const CF_VECTOR_KEYS: &str = "vector_keys";
const CF_VECTOR_META: &str = "vector_meta";
const CF_PROVIDER_DIMS: &str = "provider_dims";

/// Extra neighbors fetched beyond k to survive self-exclusion and tie
/// reordering at the cutoff.
const OVERFETCH: usize = 8;

/// Metadata stored per ANN key.
///
/// `mode` is always "document": query vectors are ephemeral and never
/// persisted, but the tag is stored so a vector's provenance is complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    key: u64,
    provider_id: String,
    record_id: String,
    #[serde(default = "document_mode")]
    mode: String,
    #[serde(default)]
    generated_at_ms: i64,
}

fn document_mode() -> String {
    "document".to_string()
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Vector store configuration.
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub path: PathBuf,
    pub metric: DistanceMetric,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
}

impl VectorStoreConfig {
    pub fn new(path: impl Into<PathBuf>, metric: DistanceMetric) -> Self {
        Self {
            path: path.into(),
            metric,
            connectivity: 16,
            expansion_add: 200,
            expansion_search: 100,
        }
    }
}

/// Result of an index rebuild.
#[derive(Debug, Clone)]
pub struct RebuildStats {
    pub provider_id: String,
    pub vectors: usize,
}

/// Vector store over RocksDB with per-provider HNSW projections.
pub struct VectorStore {
    db: DB,
    config: VectorStoreConfig,
    next_key: AtomicU64,
    indexes: RwLock<HashMap<String, Arc<HnswIndex>>>,
}

fn vec_key(provider_id: &str, record_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(provider_id.len() + record_id.len() + 1);
    key.extend_from_slice(provider_id.as_bytes());
    key.push(0);
    key.extend_from_slice(record_id.as_bytes());
    key
}

impl VectorStore {
    /// Open the store, creating it if necessary. Indexes are built lazily
    /// per provider on first use.
    pub fn open(config: VectorStoreConfig) -> Result<Self, VectorError> {
        info!(path = ?config.path, metric = config.metric.as_str(), "Opening vector store");

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let descriptors = vec![
            ColumnFamilyDescriptor::new(CF_VECTORS, Options::default()),
            ColumnFamilyDescriptor::new(CF_VECTOR_KEYS, Options::default()),
            ColumnFamilyDescriptor::new(CF_VECTOR_META, Options::default()),
            ColumnFamilyDescriptor::new(CF_PROVIDER_DIMS, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&db_opts, &config.path, descriptors)?;

        let next_key = Self::load_next_key(&db)?;

        Ok(Self {
            db,
            config,
            next_key: AtomicU64::new(next_key),
            indexes: RwLock::new(HashMap::new()),
        })
    }

    fn load_next_key(db: &DB) -> Result<u64, VectorError> {
        let cf = db
            .cf_handle(CF_VECTOR_META)
            .ok_or_else(|| VectorError::Index("missing vector_meta".to_string()))?;
        let mut iter = db.iterator_cf(&cf, IteratorMode::End);
        if let Some(item) = iter.next() {
            let (key, _) = item?;
            if key.len() == 8 {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&key);
                return Ok(u64::from_be_bytes(buf) + 1);
            }
        }
        Ok(0)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, VectorError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| VectorError::Index(format!("missing column family {}", name)))
    }

    /// Declared dimension for a provider, fixed by its first insert.
    pub fn provider_dimension(&self, provider_id: &str) -> Result<Option<usize>, VectorError> {
        let cf = self.cf(CF_PROVIDER_DIMS)?;
        match self.db.get_cf(cf, provider_id.as_bytes())? {
            Some(bytes) if bytes.len() == 8 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                Ok(Some(u64::from_le_bytes(buf) as usize))
            }
            _ => Ok(None),
        }
    }

    /// Providers with at least one stored vector.
    pub fn providers(&self) -> Result<Vec<String>, VectorError> {
        let cf = self.cf(CF_PROVIDER_DIMS)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            out.push(String::from_utf8_lossy(&key).to_string());
        }
        Ok(out)
    }

    /// Insert or replace a record's vector for a provider.
    pub fn insert(
        &self,
        provider_id: &str,
        record_id: &str,
        embedding: &Embedding,
    ) -> Result<(), VectorError> {
        match self.provider_dimension(provider_id)? {
            Some(dim) if dim != embedding.dimension() => {
                return Err(VectorError::DimensionMismatch {
                    expected: dim,
                    actual: embedding.dimension(),
                });
            }
            Some(_) => {}
            None => {
                let cf = self.cf(CF_PROVIDER_DIMS)?;
                self.db.put_cf(
                    cf,
                    provider_id.as_bytes(),
                    (embedding.dimension() as u64).to_le_bytes(),
                )?;
            }
        }

        let storage_key = vec_key(provider_id, record_id);
        let keys_cf = self.cf(CF_VECTOR_KEYS)?;

        // Reuse the ANN key when re-embedding an existing record.
        let ann_key = match self.db.get_cf(keys_cf, &storage_key)? {
            Some(bytes) if bytes.len() == 8 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                u64::from_be_bytes(buf)
            }
            _ => self.next_key.fetch_add(1, Ordering::SeqCst),
        };

        let entry = VectorEntry {
            key: ann_key,
            provider_id: provider_id.to_string(),
            record_id: record_id.to_string(),
            mode: document_mode(),
            generated_at_ms: now_ms(),
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_VECTORS)?, &storage_key, embedding.to_le_bytes());
        batch.put_cf(keys_cf, &storage_key, ann_key.to_be_bytes());
        batch.put_cf(
            self.cf(CF_VECTOR_META)?,
            ann_key.to_be_bytes(),
            serde_json::to_vec(&entry)?,
        );
        self.db.write(batch)?;

        // Keep the live projection current; a rebuild would pick the vector
        // up anyway, this just shortens the staleness window. A lazily built
        // index may already hold this key (the build scans the store after
        // the write above), so replace rather than double-add.
        let index = self.ensure_index(provider_id, embedding.dimension())?;
        if index.contains(ann_key) {
            index.remove(ann_key)?;
        }
        index.add(ann_key, embedding)?;

        debug!(provider = provider_id, record = record_id, key = ann_key, "Inserted vector");
        Ok(())
    }

    /// Stored vector for a record, if any.
    pub fn get(
        &self,
        provider_id: &str,
        record_id: &str,
    ) -> Result<Option<Embedding>, VectorError> {
        let Some(dimension) = self.provider_dimension(provider_id)? else {
            return Ok(None);
        };
        let cf = self.cf(CF_VECTORS)?;
        match self.db.get_cf(cf, vec_key(provider_id, record_id))? {
            Some(bytes) => Ok(Some(
                Embedding::from_le_bytes(&bytes, dimension)
                    .map_err(|e| VectorError::Serialization(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    /// Number of vectors persisted for a provider.
    pub fn count(&self, provider_id: &str) -> Result<usize, VectorError> {
        let cf = self.cf(CF_VECTORS)?;
        let mut prefix = provider_id.as_bytes().to_vec();
        prefix.push(0);

        let mut count = 0;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    /// Top-k nearest records for a query vector within one provider's
    /// partition, ascending by distance, ties broken by record id.
    ///
    /// `exclude` drops a record (the query record in similar-to-record
    /// mode) from the results.
    pub fn search(
        &self,
        provider_id: &str,
        query: &Embedding,
        k: usize,
        exclude: Option<&str>,
    ) -> Result<SimilarityResult, VectorError> {
        if k == 0 {
            return Ok(vec![]);
        }
        let Some(dimension) = self.provider_dimension(provider_id)? else {
            return Ok(vec![]);
        };
        if query.dimension() != dimension {
            return Err(VectorError::DimensionMismatch {
                expected: dimension,
                actual: query.dimension(),
            });
        }

        let index = self.ensure_index(provider_id, dimension)?;
        let raw = index.search(query, k + OVERFETCH)?;

        let meta_cf = self.cf(CF_VECTOR_META)?;
        let mut hits: Vec<SearchHit> = Vec::with_capacity(raw.len());
        for (key, distance) in raw {
            let Some(bytes) = self.db.get_cf(meta_cf, key.to_be_bytes())? else {
                // Key present in a stale index but pruned from the store.
                continue;
            };
            let entry: VectorEntry = serde_json::from_slice(&bytes)?;
            if exclude == Some(entry.record_id.as_str()) {
                continue;
            }
            hits.push(SearchHit::new(entry.record_id, distance));
        }

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Rebuild one provider's index from the store, with capacity retuned
    /// to the current corpus size. The fresh index is built off to the side
    /// and swapped in atomically; queries keep hitting the old one until
    /// the swap.
    pub fn rebuild(&self, provider_id: &str) -> Result<RebuildStats, VectorError> {
        let Some(dimension) = self.provider_dimension(provider_id)? else {
            return Ok(RebuildStats {
                provider_id: provider_id.to_string(),
                vectors: 0,
            });
        };

        let fresh = self.build_index(provider_id, dimension)?;
        let vectors = fresh.len();

        let mut indexes = self
            .indexes
            .write()
            .map_err(|e| VectorError::Index(e.to_string()))?;
        indexes.insert(provider_id.to_string(), Arc::new(fresh));

        info!(provider = provider_id, vectors = vectors, "Rebuilt vector index");
        Ok(RebuildStats {
            provider_id: provider_id.to_string(),
            vectors,
        })
    }

    /// Statistics for one provider partition.
    pub fn stats(&self, provider_id: &str) -> Result<IndexStats, VectorError> {
        let stored_count = self.count(provider_id)?;
        let dimension = self.provider_dimension(provider_id)?.unwrap_or(0);
        let indexed_count = self
            .indexes
            .read()
            .map_err(|e| VectorError::Index(e.to_string()))?
            .get(provider_id)
            .map(|i| i.len())
            .unwrap_or(0);

        Ok(IndexStats {
            provider_id: provider_id.to_string(),
            indexed_count,
            stored_count,
            dimension,
        })
    }

    /// Current index for a provider, building it from the store on first
    /// use.
    fn ensure_index(
        &self,
        provider_id: &str,
        dimension: usize,
    ) -> Result<Arc<HnswIndex>, VectorError> {
        {
            let indexes = self
                .indexes
                .read()
                .map_err(|e| VectorError::Index(e.to_string()))?;
            if let Some(index) = indexes.get(provider_id) {
                return Ok(index.clone());
            }
        }

        let built = Arc::new(self.build_index(provider_id, dimension)?);

        let mut indexes = self
            .indexes
            .write()
            .map_err(|e| VectorError::Index(e.to_string()))?;
        // Another thread may have built it while we were scanning.
        let index = indexes
            .entry(provider_id.to_string())
            .or_insert(built)
            .clone();
        Ok(index)
    }

    /// Scan the store and build a fresh index for one provider. Vectors are
    /// visited in record-id order so construction is deterministic.
    fn build_index(&self, provider_id: &str, dimension: usize) -> Result<HnswIndex, VectorError> {
        let stored = self.count(provider_id)?;
        let config = HnswConfig::new(dimension, self.config.metric)
            .with_tuning(
                self.config.connectivity,
                self.config.expansion_add,
                self.config.expansion_search,
            )
            .with_capacity((stored * 2).max(1024));
        let index = HnswIndex::create(config)?;

        let vectors_cf = self.cf(CF_VECTORS)?;
        let keys_cf = self.cf(CF_VECTOR_KEYS)?;
        let mut prefix = provider_id.as_bytes().to_vec();
        prefix.push(0);

        let iter = self
            .db
            .iterator_cf(vectors_cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let Some(ann_bytes) = self.db.get_cf(keys_cf, &key)? else {
                continue;
            };
            if ann_bytes.len() != 8 {
                continue;
            }
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&ann_bytes);
            let ann_key = u64::from_be_bytes(buf);

            let embedding = Embedding::from_le_bytes(&value, dimension)
                .map_err(|e| VectorError::Serialization(e.to_string()))?;
            index.add(ann_key, &embedding)?;
        }

        Ok(index)
    }
}
