//! Embedding provider trait.
//!
//! Providers are selected by configuration and used through this interface
//! only; call sites never branch on the concrete provider kind.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::Embedding;
use crate::error::EmbeddingError;

/// Encoding mode.
///
/// Document-mode and query-mode vectors for the same literal text are not
/// interchangeable: a provider may prefix query text with an instruction
/// string before encoding, and similarity search relies on documents being
/// encoded one way and queries the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeMode {
    /// Stored-record encoding.
    Document,
    /// Search-query encoding.
    Query,
}

impl EncodeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodeMode::Document => "document",
            EncodeMode::Query => "query",
        }
    }
}

/// Trait for embedding providers.
///
/// Implementations must be thread-safe (Send + Sync) for concurrent use and
/// must return vectors of exactly `dimension()` components, every time.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable provider identifier, stored alongside every vector it
    /// produces. Vectors from different providers are never comparable.
    fn id(&self) -> &str;

    /// Declared vector dimension. Never varies for a provider.
    fn dimension(&self) -> usize;

    /// Encode text into a vector in the given mode.
    async fn encode(&self, text: &str, mode: EncodeMode) -> Result<Embedding, EmbeddingError>;

    /// Cheap liveness probe, used before routing work to a provider.
    async fn health_check(&self) -> Result<(), EmbeddingError>;
}
