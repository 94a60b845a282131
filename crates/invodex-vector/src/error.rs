//! Vector store error types.

use thiserror::Error;

/// Errors that can occur in the vector store.
#[derive(Debug, Error)]
pub enum VectorError {
    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// usearch index error
    #[error("index error: {0}")]
    Index(String),

    /// Dimension mismatch
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unknown metric name in configuration
    #[error("unknown distance metric: {0}")]
    UnknownMetric(String),

    /// Vector not found
    #[error("vector not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for VectorError {
    fn from(err: serde_json::Error) -> Self {
        VectorError::Serialization(err.to_string())
    }
}
