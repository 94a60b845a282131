//! Canonical vendor type and aggregate merge.
//!
//! Vendors are owned by the normalizer and mutated only through the storage
//! layer's merge-based upsert. `absorb` is the merge function: associative
//! and order-insensitive for the aggregate fields, so concurrent records for
//! the same vendor both land without a read-modify-write cycle.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A canonical vendor with aggregate statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    /// Stable id derived from the canonical name (see [`vendor_id_for`]).
    pub id: String,
    pub canonical_name: String,
    /// Raw name variants that resolved to this vendor.
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    pub total_spent: f64,
    pub record_count: u64,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    #[serde(default)]
    pub category: Option<String>,
}

impl Vendor {
    /// Seed vendor for a single record; merged into the stored vendor (if
    /// any) by the storage layer.
    pub fn seed(
        canonical_name: impl Into<String>,
        raw_alias: impl Into<String>,
        amount: f64,
        date: NaiveDate,
        category: Option<String>,
    ) -> Self {
        let canonical_name = canonical_name.into();
        let mut aliases = BTreeSet::new();
        let raw = raw_alias.into();
        if !raw.is_empty() {
            aliases.insert(raw);
        }
        Self {
            id: vendor_id_for(&canonical_name),
            canonical_name,
            aliases,
            total_spent: amount,
            record_count: 1,
            first_seen: date,
            last_seen: date,
            category,
        }
    }

    /// Fold another vendor state into this one. Associative, so the storage
    /// merge operator can fold any number of concurrent seeds in any
    /// grouping and reach the same totals.
    pub fn absorb(&mut self, other: &Vendor) {
        self.total_spent += other.total_spent;
        self.record_count += other.record_count;
        if other.first_seen < self.first_seen {
            self.first_seen = other.first_seen;
        }
        if other.last_seen > self.last_seen {
            self.last_seen = other.last_seen;
        }
        self.aliases.extend(other.aliases.iter().cloned());
        if self.category.is_none() {
            self.category = other.category.clone();
        }
    }
}

/// Derive the stable vendor id from a canonical name: lowercase, with
/// non-alphanumeric runs collapsed to single hyphens.
pub fn vendor_id_for(canonical_name: &str) -> String {
    let mut id = String::with_capacity(canonical_name.len());
    let mut pending_hyphen = false;
    for c in canonical_name.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !id.is_empty() {
                id.push('-');
            }
            pending_hyphen = false;
            id.extend(c.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    id
}
