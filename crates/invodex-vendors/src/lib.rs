//! # invodex-vendors
//!
//! Vendor name canonicalization for Invodex.
//!
//! Raw vendor strings from invoices ("Amazon Web Services, Inc.", "AWS",
//! "A.W.S.") resolve to one canonical vendor with aggregate statistics.
//! Resolution order: clean the name, exact-match the static alias map,
//! fuzzy-match known vendors, otherwise create a new canonical vendor.
//!
//! Aggregates are updated through the storage layer's associative merge, so
//! concurrent records for the same vendor never lose updates.

pub mod error;
pub mod normalizer;
pub mod registry;
pub mod similarity;

pub use error::VendorError;
pub use normalizer::{clean_name, infer_category, lookup_alias, UNKNOWN_VENDOR};
pub use registry::VendorRegistry;
pub use similarity::trigram_similarity;
