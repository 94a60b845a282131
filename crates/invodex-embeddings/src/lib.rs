//! # invodex-embeddings
//!
//! Embedding generation for Invodex invoice records.
//!
//! Providers are polymorphic over `encode` and `health_check`: a locally
//! hosted BGE model via Candle (no API calls, works offline after the first
//! model download) or an OpenAI-compatible embeddings API. A provider chain
//! falls back from primary to secondary and always reports which provider
//! actually produced a vector.
//!
//! Encoding is asymmetric: query-mode requests are prefixed with the BGE
//! instruction string, so query and document vectors for the same literal
//! text intentionally differ and must never be compared with each other.

pub mod cache;
pub mod canonical;
pub mod chain;
pub mod embedding;
pub mod error;
pub mod local;
pub mod provider;
pub mod remote;

pub use cache::{EmbeddingCache, MemoryEmbeddingCache};
pub use canonical::{canonical_text, text_hash};
pub use chain::{EncodeAttempt, EncodeReport, ProviderChain};
pub use embedding::Embedding;
pub use error::EmbeddingError;
pub use local::{
    get_or_download_model, release_process_model, BgeModel, LocalProvider, ModelCache,
    ModelPaths, BGE_QUERY_PREFIX, DEFAULT_MODEL_REPO, MODEL_FILES,
};
pub use provider::{EmbeddingProvider, EncodeMode};
pub use remote::{ApiProvider, ApiProviderConfig};
