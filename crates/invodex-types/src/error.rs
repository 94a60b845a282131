//! Error taxonomy shared across the Invodex crates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal reasons a submitted document is rejected.
///
/// Rejection is reported to the caller and never retried. Everything short of
/// these outcomes (low confidence, line-item mismatches, embedding failures)
/// degrades the record instead of rejecting it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RejectReason {
    /// No extractable text at all. Detected before any extraction attempt.
    #[error("document contains no extractable text")]
    Unreadable,

    /// Vendor, amount and date are all absent after both extraction stages.
    #[error("mandatory fields missing: {missing:?}")]
    MissingMandatoryFields { missing: Vec<String> },

    /// Template matching failed and the generative extractor was unreachable
    /// after bounded retries.
    #[error("extraction unavailable: {reason}")]
    ExtractionUnavailable { reason: String },
}

/// Unified error type for cross-crate operations.
#[derive(Debug, Error)]
pub enum InvodexError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Document rejected by the extraction pipeline
    #[error("document rejected: {0}")]
    Rejected(#[from] RejectReason),

    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid input error
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
