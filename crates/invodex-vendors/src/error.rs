//! Vendor normalization error types.

use thiserror::Error;

/// Errors that can occur during vendor canonicalization.
#[derive(Debug, Error)]
pub enum VendorError {
    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] invodex_storage::StorageError),

    /// Vendor not found
    #[error("vendor not found: {0}")]
    NotFound(String),
}
