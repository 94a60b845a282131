//! # invodex-core
//!
//! The Invodex orchestrator. Wires the parse cache, extraction pipeline,
//! vendor normalizer, embedding generator and vector store into the three
//! boundary operations:
//!
//! - `submit(bytes)` - full ingestion, idempotent per content hash
//! - `semantic_search(text, limit)` - natural-language similarity query
//! - `find_similar(record_id, limit)` - similar-to-record query
//!
//! plus the background maintenance job that retries pending embeddings and
//! rebuilds the ANN index as the corpus grows. Embedding failures never
//! block record persistence; a record becomes searchable once its embedding
//! eventually succeeds.

pub mod embedder;
pub mod error;
pub mod hash;
pub mod jobs;
pub mod service;

pub use embedder::{RecordEmbedder, StorageEmbeddingCache};
pub use error::CoreError;
pub use hash::content_hash;
pub use jobs::{MaintenanceConfig, MaintenanceJob};
pub use service::{Invodex, SubmitReceipt};
