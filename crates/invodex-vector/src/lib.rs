//! # invodex-vector
//!
//! Vector store and similarity search for Invodex.
//!
//! RocksDB holds the vectors (source of truth); one usearch HNSW index per
//! embedding provider serves approximate nearest-neighbor queries as a
//! rebuildable projection over them. Vectors from different providers live
//! in different partitions and are never compared with each other.
//!
//! Ranking is deterministic: ascending distance, ties broken by record id,
//! so an unchanged corpus answers identical queries identically. Index
//! rebuilds run out of the write path; a query may observe a slightly stale
//! index until the next rebuild, which is an accepted property, not a bug.

pub mod error;
pub mod hnsw;
pub mod index;
pub mod metric;
pub mod store;

pub use error::VectorError;
pub use hnsw::{HnswConfig, HnswIndex};
pub use index::{IndexStats, SearchHit, SimilarityResult};
pub use metric::DistanceMetric;
pub use store::{RebuildStats, VectorStore, VectorStoreConfig};
