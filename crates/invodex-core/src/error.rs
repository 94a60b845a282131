//! Orchestrator error type.

use thiserror::Error;

use invodex_types::RejectReason;

/// Errors surfaced by the boundary operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Document rejected by the extraction pipeline. Terminal; not retried.
    #[error("document rejected: {0}")]
    Rejected(#[from] RejectReason),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] invodex_storage::StorageError),

    /// Vendor normalization error
    #[error("vendor error: {0}")]
    Vendor(#[from] invodex_vendors::VendorError),

    /// Embedding error
    #[error("embedding error: {0}")]
    Embedding(#[from] invodex_embeddings::EmbeddingError),

    /// Vector store error
    #[error("vector store error: {0}")]
    Vector(#[from] invodex_vector::VectorError),

    /// Template store error
    #[error("extraction error: {0}")]
    Extract(#[from] invodex_extract::ExtractError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// The record exists but has no embedding yet; it will become
    /// searchable once the maintenance job embeds it.
    #[error("embedding not ready for record {0}")]
    EmbeddingPending(String),
}
