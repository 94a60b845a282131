//! In-memory HNSW index over one provider's vectors, via usearch.
//!
//! The index is a projection of the vector store, rebuilt from RocksDB on
//! open and on maintenance rebuilds; it is never the source of truth and is
//! safe to discard.

use std::sync::RwLock;

use tracing::debug;
use usearch::{Index, IndexOptions, ScalarKind};

use invodex_embeddings::Embedding;

use crate::error::VectorError;
use crate::metric::DistanceMetric;

/// HNSW parameters for one index generation.
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Embedding dimension (must match the provider)
    pub dimension: usize,
    pub metric: DistanceMetric,
    /// Number of connections per layer (M parameter)
    pub connectivity: usize,
    /// Build-time search depth (ef_construction)
    pub expansion_add: usize,
    /// Query-time search depth (ef_search)
    pub expansion_search: usize,
    /// Reserved capacity; retuned upward on rebuild as the corpus grows
    pub capacity: usize,
}

impl HnswConfig {
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            connectivity: 16,
            expansion_add: 200,
            expansion_search: 100,
            capacity: 1024,
        }
    }

    pub fn with_tuning(mut self, connectivity: usize, ef_add: usize, ef_search: usize) -> Self {
        self.connectivity = connectivity;
        self.expansion_add = ef_add;
        self.expansion_search = ef_search;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

/// HNSW index wrapper around usearch.
pub struct HnswIndex {
    index: RwLock<Index>,
    config: HnswConfig,
}

impl HnswIndex {
    pub fn create(config: HnswConfig) -> Result<Self, VectorError> {
        let options = IndexOptions {
            dimensions: config.dimension,
            metric: config.metric.to_usearch(),
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        };

        let index = Index::new(&options).map_err(|e| VectorError::Index(e.to_string()))?;
        index
            .reserve(config.capacity.max(1))
            .map_err(|e| VectorError::Index(e.to_string()))?;

        Ok(Self {
            index: RwLock::new(index),
            config,
        })
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    pub fn len(&self) -> usize {
        self.index.read().map(|i| i.size()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a vector under a key. Callers remove a stale key first when
    /// replacing.
    pub fn add(&self, key: u64, embedding: &Embedding) -> Result<(), VectorError> {
        if embedding.dimension() != self.config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.config.dimension,
                actual: embedding.dimension(),
            });
        }

        let index = self
            .index
            .write()
            .map_err(|e| VectorError::Index(e.to_string()))?;

        // Grow in place when the reserve is exhausted.
        if index.size() >= index.capacity() {
            index
                .reserve(index.capacity() * 2)
                .map_err(|e| VectorError::Index(e.to_string()))?;
        }

        index
            .add(key, &embedding.values)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        debug!(key = key, "Added vector to index");
        Ok(())
    }

    /// Nearest neighbors as (key, distance) pairs, ascending distance.
    pub fn search(
        &self,
        query: &Embedding,
        k: usize,
    ) -> Result<Vec<(u64, f32)>, VectorError> {
        if query.dimension() != self.config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.config.dimension,
                actual: query.dimension(),
            });
        }

        let index = self
            .index
            .read()
            .map_err(|e| VectorError::Index(e.to_string()))?;
        let results = index
            .search(&query.values, k)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        Ok(results
            .keys
            .iter()
            .zip(results.distances.iter())
            .map(|(&key, &dist)| (key, dist))
            .collect())
    }

    pub fn remove(&self, key: u64) -> Result<bool, VectorError> {
        let index = self
            .index
            .write()
            .map_err(|e| VectorError::Index(e.to_string()))?;
        let removed = index
            .remove(key)
            .map_err(|e| VectorError::Index(e.to_string()))?;
        Ok(removed > 0)
    }

    pub fn contains(&self, key: u64) -> bool {
        self.index.read().map(|i| i.contains(key)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, axis: usize) -> Embedding {
        let mut values = vec![0.0; dim];
        values[axis] = 1.0;
        Embedding::new(values)
    }

    fn random_embedding(dim: usize) -> Embedding {
        use rand::Rng;
        let mut rng = rand::rng();
        let values: Vec<f32> = (0..dim).map(|_| rng.random()).collect();
        Embedding::new(values)
    }

    #[test]
    fn test_create_empty() {
        let index = HnswIndex::create(HnswConfig::new(8, DistanceMetric::Cosine)).unwrap();
        assert_eq!(index.dimension(), 8);
        assert!(index.is_empty());
    }

    #[test]
    fn test_add_and_search_ascending() {
        let index = HnswIndex::create(HnswConfig::new(4, DistanceMetric::Cosine)).unwrap();
        index.add(1, &unit(4, 0)).unwrap();
        index.add(2, &unit(4, 1)).unwrap();
        index
            .add(3, &Embedding::new(vec![1.0, 0.2, 0.0, 0.0]))
            .unwrap();

        let hits = index.search(&unit(4, 0), 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, 1);
        // Exact match has ~zero cosine distance.
        assert!(hits[0].1 < 1e-5);
        for pair in hits.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let index = HnswIndex::create(HnswConfig::new(4, DistanceMetric::Cosine)).unwrap();
        let result = index.add(1, &unit(8, 0));
        assert!(matches!(result, Err(VectorError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_remove() {
        let index = HnswIndex::create(HnswConfig::new(4, DistanceMetric::Cosine)).unwrap();
        index.add(7, &unit(4, 2)).unwrap();
        assert!(index.contains(7));
        assert!(index.remove(7).unwrap());
        assert!(!index.contains(7));
    }

    #[test]
    fn test_search_caps_at_index_size() {
        let index = HnswIndex::create(HnswConfig::new(32, DistanceMetric::Cosine)).unwrap();
        for i in 0..8 {
            index.add(i, &random_embedding(32)).unwrap();
        }
        let hits = index.search(&random_embedding(32), 50).unwrap();
        assert_eq!(hits.len(), 8);
        for pair in hits.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn test_grows_past_reserved_capacity() {
        let config = HnswConfig::new(4, DistanceMetric::Cosine).with_capacity(2);
        let index = HnswIndex::create(config).unwrap();
        for i in 0..16 {
            index
                .add(i, &Embedding::new(vec![i as f32 + 1.0, 1.0, 0.0, 0.0]))
                .unwrap();
        }
        assert_eq!(index.len(), 16);
    }
}
