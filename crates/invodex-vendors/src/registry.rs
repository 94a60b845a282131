//! Vendor registry: canonicalization against stored vendors plus the
//! merge-based aggregate upsert.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use invodex_storage::Storage;
use invodex_types::{vendor_id_for, Vendor, VendorSettings};

use crate::error::VendorError;
use crate::normalizer::{clean_name, infer_category, lookup_alias, UNKNOWN_VENDOR};
use crate::similarity::trigram_similarity;

/// Canonicalizes raw vendor names and maintains vendor aggregates.
pub struct VendorRegistry {
    storage: Arc<Storage>,
    similarity_threshold: f32,
}

impl VendorRegistry {
    pub fn new(storage: Arc<Storage>, settings: &VendorSettings) -> Self {
        Self {
            storage,
            similarity_threshold: settings.similarity_threshold,
        }
    }

    /// Resolve a raw vendor string to its canonical name without recording
    /// anything.
    ///
    /// Order: clean, exact alias map, fuzzy match against known canonical
    /// names and aliases, otherwise the cleaned name itself becomes a new
    /// canonical name.
    pub fn resolve_name(&self, raw: &str) -> Result<String, VendorError> {
        let cleaned = clean_name(raw);
        if cleaned.is_empty() {
            return Ok(UNKNOWN_VENDOR.to_string());
        }

        if let Some(canonical) = lookup_alias(&cleaned) {
            return Ok(canonical.to_string());
        }

        if let Some(canonical) = self.fuzzy_match(&cleaned)? {
            return Ok(canonical);
        }

        Ok(cleaned)
    }

    /// Best fuzzy match over stored canonical names and their aliases.
    fn fuzzy_match(&self, cleaned: &str) -> Result<Option<String>, VendorError> {
        let mut best: Option<(f32, String)> = None;

        for vendor in self.storage.list_vendors()? {
            let mut score = trigram_similarity(cleaned, &vendor.canonical_name);
            for alias in &vendor.aliases {
                score = score.max(trigram_similarity(cleaned, &clean_name(alias)));
            }
            if score >= self.similarity_threshold
                && best.as_ref().map_or(true, |(s, _)| score > *s)
            {
                best = Some((score, vendor.canonical_name.clone()));
            }
        }

        if let Some((score, ref name)) = best {
            debug!(cleaned = cleaned, matched = %name, score = score, "Fuzzy vendor match");
        }
        Ok(best.map(|(_, name)| name))
    }

    /// Canonicalize a raw name and fold one record's contribution into the
    /// vendor's aggregates. Returns the merged vendor state.
    ///
    /// The write is a single storage merge; two concurrent records for the
    /// same vendor are both reflected.
    pub fn record(
        &self,
        raw_name: &str,
        amount: f64,
        date: NaiveDate,
    ) -> Result<Vendor, VendorError> {
        let canonical = self.resolve_name(raw_name)?;
        let vendor_id = vendor_id_for(&canonical);

        let category = match self.storage.get_vendor(&vendor_id)? {
            Some(existing) => existing.category,
            None => infer_category(&canonical),
        };

        let seed = Vendor::seed(&canonical, raw_name.trim(), amount, date, category);
        self.storage.merge_vendor_seed(&seed)?;

        self.storage
            .get_vendor(&seed.id)?
            .ok_or_else(|| VendorError::NotFound(seed.id.clone()))
    }
}
