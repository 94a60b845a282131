//! # invodex-types
//!
//! Shared domain types for the Invodex invoice intelligence system.
//!
//! This crate defines the core data structures used throughout the system:
//! - Extracted invoice records and their line items
//! - Parse-cache entries keyed by document content hash
//! - Canonical vendors with aggregate statistics
//! - Settings: layered configuration types

pub mod config;
pub mod error;
pub mod record;
pub mod vendor;

pub use config::{
    EmbeddingSettings, ExtractionSettings, IndexSettings, Settings, VendorSettings,
};
pub use error::{InvodexError, RejectReason};
pub use record::{
    CacheEntry, EmbeddingStatus, ExtractedFields, ExtractionMethod, InvoiceRecord, LineItem,
    ReviewReason, AMOUNT_TOLERANCE, DEFAULT_CATEGORY, EXTRACTOR_VERSION, INVOICE_CATEGORIES,
};
pub use vendor::{vendor_id_for, Vendor};
