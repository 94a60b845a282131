//! Invoice record types.
//!
//! `ExtractedFields` is the raw shape produced by an extraction stage and the
//! shape stored in the parse cache. `InvoiceRecord` is the persisted record
//! after vendor normalization and validation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Version tag baked into parse-cache keys. Bumping it starts a fresh key
/// space so cached results from an older extractor are never reused.
pub const EXTRACTOR_VERSION: &str = "1.0.0";

/// Amounts closer than this are treated as equal after float rounding.
/// A full cent of drift is a mismatch.
pub const AMOUNT_TOLERANCE: f64 = 0.005;

/// Closed category set the generative extractor classifies into.
pub const INVOICE_CATEGORIES: &[&str] = &[
    "Software/SaaS",
    "Office Supplies",
    "Marketing/Advertising",
    "Professional Services",
    "Travel & Entertainment",
    "Utilities",
    "Equipment/Hardware",
    "Insurance",
    "Rent/Facilities",
    "Payroll Services",
    "Shipping/Fulfillment",
    "Other",
];

/// Category used when no classification is available.
pub const DEFAULT_CATEGORY: &str = "Other";

/// Which extraction stage produced the fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Deterministic template match
    Template,
    /// Generative extractor fallback
    Generative,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Template => "template",
            ExtractionMethod::Generative => "generative",
        }
    }
}

/// Why a record was flagged for human review.
///
/// Review reasons demote confidence but never reject the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewReason {
    /// Line-item totals do not sum to the stated invoice total.
    LineItemSumMismatch { stated: f64, computed: f64 },
    /// quantity * unit_price disagrees with the line total.
    LineItemArithmetic { index: usize },
    /// Confidence stayed below threshold even after the generative fallback.
    LowConfidence { confidence: f32 },
    /// The extracted date string matched no known format.
    UnparseableDate { raw: String },
}

/// Whether a record's embedding has been generated yet.
///
/// A record persists and is queryable by id regardless; it only appears in
/// similarity results once its embedding is `Ready`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EmbeddingStatus {
    /// Awaiting generation (initial state, or provider chain exhausted;
    /// retried by the maintenance job).
    Pending,
    /// Generated and indexed by the named provider.
    Ready { provider_id: String },
}

/// A single line on an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit_price: Option<f64>,
    pub total: f64,
}

impl LineItem {
    /// Check `quantity * unit_price ≈ total`. Items without both quantity
    /// and unit price are vacuously consistent.
    pub fn arithmetic_consistent(&self) -> bool {
        match (self.quantity, self.unit_price) {
            (Some(q), Some(p)) => (q * p - self.total).abs() <= AMOUNT_TOLERANCE,
            _ => true,
        }
    }
}

/// Raw field set produced by an extraction stage, before normalization.
///
/// This is the shape cached in the parse cache, so it must stay stable
/// across releases that do not bump [`EXTRACTOR_VERSION`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub vendor: String,
    /// Accepts "invoice_number", the name generative extractors emit.
    #[serde(default, alias = "invoice_number")]
    pub document_number: Option<String>,
    /// Date as extracted, parsed later against the known format list.
    #[serde(default)]
    pub date: Option<String>,
    pub total_amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub purchaser: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl ExtractedFields {
    /// Sum of line-item totals, or None when there are no line items.
    pub fn line_item_sum(&self) -> Option<f64> {
        if self.line_items.is_empty() {
            None
        } else {
            Some(self.line_items.iter().map(|i| i.total).sum())
        }
    }
}

/// Parse-cache entry: one extraction result per unique content hash.
///
/// Immutable once written. The cache column family keeps the first writer's
/// value, so a losing concurrent computation is discarded, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fields: ExtractedFields,
    pub method: ExtractionMethod,
    pub confidence: f32,
    pub computed_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Cache key for a content hash under the current extractor version.
    pub fn key_for(content_hash: &str) -> String {
        format!("{}_{}", content_hash, EXTRACTOR_VERSION)
    }
}

/// A validated, persisted invoice record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// ULID string. Lexicographic order is creation order, which makes this
    /// the stable tie-break key for similarity results.
    pub id: String,
    /// Vendor name as written on the document.
    pub vendor_name: String,
    /// Canonical vendor id assigned by the normalizer.
    pub vendor_id: String,
    #[serde(default)]
    pub document_number: Option<String>,
    pub date: NaiveDate,
    pub total_amount: f64,
    pub currency: String,
    pub category: String,
    #[serde(default)]
    pub purchaser: Option<String>,
    pub is_recurring: bool,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    /// Extractor-reported confidence in [0, 1].
    pub confidence: f32,
    pub method: ExtractionMethod,
    #[serde(default)]
    pub review: Vec<ReviewReason>,
    pub embedding: EmbeddingStatus,
    /// SHA-256 of the source document bytes.
    pub content_hash: String,
    pub parsed_at: DateTime<Utc>,
}

impl InvoiceRecord {
    pub fn needs_review(&self) -> bool {
        !self.review.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_item_arithmetic_consistent() {
        let item = LineItem {
            description: "compute hours".to_string(),
            quantity: Some(3.0),
            unit_price: Some(40.0),
            total: 120.0,
        };
        assert!(item.arithmetic_consistent());
    }

    #[test]
    fn test_line_item_arithmetic_mismatch() {
        let item = LineItem {
            description: "compute hours".to_string(),
            quantity: Some(3.0),
            unit_price: Some(40.0),
            total: 119.0,
        };
        assert!(!item.arithmetic_consistent());
    }

    #[test]
    fn test_line_item_without_quantity_is_consistent() {
        let item = LineItem {
            description: "flat fee".to_string(),
            quantity: None,
            unit_price: None,
            total: 99.0,
        };
        assert!(item.arithmetic_consistent());
    }

    #[test]
    fn test_line_item_sum() {
        let fields = ExtractedFields {
            vendor: "Acme".to_string(),
            document_number: None,
            date: None,
            total_amount: 30.0,
            currency: "USD".to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            purchaser: None,
            is_recurring: false,
            line_items: vec![
                LineItem {
                    description: "a".to_string(),
                    quantity: None,
                    unit_price: None,
                    total: 10.0,
                },
                LineItem {
                    description: "b".to_string(),
                    quantity: None,
                    unit_price: None,
                    total: 20.0,
                },
            ],
        };
        assert_eq!(fields.line_item_sum(), Some(30.0));
    }

    #[test]
    fn test_cache_key_includes_version() {
        let key = CacheEntry::key_for("abc123");
        assert!(key.starts_with("abc123_"));
        assert!(key.ends_with(EXTRACTOR_VERSION));
    }

    #[test]
    fn test_extracted_fields_defaults() {
        let json = r#"{"vendor": "Acme", "total_amount": 12.5}"#;
        let fields: ExtractedFields = serde_json::from_str(json).unwrap();
        assert_eq!(fields.currency, "USD");
        assert_eq!(fields.category, DEFAULT_CATEGORY);
        assert!(fields.line_items.is_empty());
        assert!(!fields.is_recurring);
    }

    #[test]
    fn test_review_reason_roundtrip() {
        let reason = ReviewReason::LineItemSumMismatch {
            stated: 120.0,
            computed: 119.99,
        };
        let json = serde_json::to_string(&reason).unwrap();
        let decoded: ReviewReason = serde_json::from_str(&json).unwrap();
        assert_eq!(reason, decoded);
    }
}
