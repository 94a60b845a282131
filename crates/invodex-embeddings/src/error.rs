//! Embedding error types.

use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Candle model error
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Tokenizer error
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Model file not found
    #[error("model file not found: {0}")]
    ModelNotFound(String),

    /// Download error
    #[error("failed to download model: {0}")]
    Download(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote provider request failed
    #[error("provider API error: {0}")]
    Api(String),

    /// Remote provider rate limit
    #[error("provider rate limit exceeded")]
    RateLimited,

    /// Every provider in the chain failed
    #[error("all embedding providers failed: {0}")]
    Exhausted(String),

    /// Dimension mismatch
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Internal error (task join, poisoned state)
    #[error("internal error: {0}")]
    Internal(String),
}

impl EmbeddingError {
    /// Whether a retry against the same provider could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EmbeddingError::Api(_) | EmbeddingError::RateLimited | EmbeddingError::Io(_)
        )
    }
}
