//! Field validation.
//!
//! Validation never fixes data; it reports what is missing and what needs a
//! human eye. The pipeline rejects only when every mandatory field (vendor,
//! amount, date) is absent; anything less demotes confidence and flags the
//! record for review.

use invodex_types::{ExtractedFields, ReviewReason, AMOUNT_TOLERANCE};

use crate::dates::parse_date;

/// Outcome of validating a field set.
#[derive(Debug, Default)]
pub struct Validation {
    /// Review reasons to attach to the record.
    pub review: Vec<ReviewReason>,
    /// Mandatory fields that are absent ("vendor", "amount", "date").
    pub missing: Vec<String>,
}

impl Validation {
    /// All three mandatory fields absent: nothing worth persisting.
    pub fn mandatory_fields_all_absent(&self) -> bool {
        self.missing.len() == 3
    }
}

/// Validate field presence, range sanity and the line-item invariants.
pub fn validate_fields(fields: &ExtractedFields) -> Validation {
    let mut v = Validation::default();

    if fields.vendor.trim().is_empty() {
        v.missing.push("vendor".to_string());
    }
    if fields.total_amount <= 0.0 {
        v.missing.push("amount".to_string());
    }
    match fields.date.as_deref() {
        None => v.missing.push("date".to_string()),
        Some(raw) if raw.trim().is_empty() => v.missing.push("date".to_string()),
        Some(raw) => {
            if parse_date(raw).is_none() {
                v.review.push(ReviewReason::UnparseableDate {
                    raw: raw.to_string(),
                });
            }
        }
    }

    for (index, item) in fields.line_items.iter().enumerate() {
        if !item.arithmetic_consistent() {
            v.review.push(ReviewReason::LineItemArithmetic { index });
        }
    }

    if let Some(computed) = fields.line_item_sum() {
        if (computed - fields.total_amount).abs() > AMOUNT_TOLERANCE {
            v.review.push(ReviewReason::LineItemSumMismatch {
                stated: fields.total_amount,
                computed,
            });
        }
    }

    v
}
