//! # invodex-storage
//!
//! RocksDB persistence for Invodex.
//!
//! Column families isolate the system's data sets:
//! - parse_cache: content-addressed extraction results (keep-first merge)
//! - records: persisted invoice records by ULID
//! - records_by_hash: content hash -> record id (submit idempotence)
//! - vendors: canonical vendors (associative aggregate merge)
//! - embedding_cache: encoded vectors by (text hash, provider, mode)
//! - embed_outbox: record ids awaiting embedding generation
//!
//! Concurrency discipline lives in the merge operators: the parse cache
//! keeps the first written value so concurrent duplicate submissions race
//! safely, and vendor aggregates fold associatively so no update is lost to
//! a read-modify-write cycle.

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_EMBED_CACHE, CF_EMBED_OUTBOX, CF_PARSE_CACHE,
    CF_RECORDS, CF_RECORDS_BY_HASH, CF_VENDORS,
};
pub use db::Storage;
pub use error::StorageError;
pub use keys::embed_cache_key;
