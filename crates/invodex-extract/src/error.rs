//! Extraction error types.

use thiserror::Error;

/// Errors that can occur during extraction.
///
/// Note that a document being rejected is not an `ExtractError`; rejection
/// is an [`Outcome`](crate::pipeline::Outcome) variant. These errors cover
/// infrastructure failures inside a stage.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Generative provider network/timeout failure. Transient; retried with
    /// bounded backoff.
    #[error("extraction provider error: {0}")]
    Provider(String),

    /// Generative provider rate limit
    #[error("extraction provider rate limit exceeded")]
    RateLimited,

    /// The provider answered but the response was unusable
    #[error("unparseable provider response: {0}")]
    Parse(String),

    /// Template file load/store error
    #[error("template error: {0}")]
    Template(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExtractError::Provider(_) | ExtractError::RateLimited)
    }
}
