//! Canonical text representation of an invoice record.
//!
//! The field set and ordering are fixed so that embeddings of structurally
//! similar records are comparable. Any change here changes every record's
//! canonical text and therefore forces re-embedding; treat the layout as a
//! wire format.

use sha2::{Digest, Sha256};

use invodex_types::InvoiceRecord;

/// Build the canonical text for a record.
pub fn canonical_text(record: &InvoiceRecord) -> String {
    format!(
        "Invoice Information:\n\
         Vendor: {} ({})\n\
         Category: {}\n\
         Amount: ${:.2}\n\
         Date: {}\n\
         Invoice Number: {}\n\
         Recurring: {}\n\
         Purchaser: {}",
        record.vendor_name,
        record.vendor_id,
        record.category,
        record.total_amount,
        record.date.format("%Y-%m-%d"),
        record.document_number.as_deref().unwrap_or("N/A"),
        if record.is_recurring { "Yes" } else { "No" },
        record.purchaser.as_deref().unwrap_or("N/A"),
    )
}

/// SHA-256 hex digest of a canonical text, used as the embedding-cache key
/// component.
pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use invodex_types::{EmbeddingStatus, ExtractionMethod};

    fn record() -> InvoiceRecord {
        InvoiceRecord {
            id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
            vendor_name: "Amazon Web Services, Inc.".to_string(),
            vendor_id: "amazon-web-services".to_string(),
            document_number: Some("INV-42".to_string()),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            total_amount: 120.0,
            currency: "USD".to_string(),
            category: "Cloud Services".to_string(),
            purchaser: None,
            is_recurring: true,
            line_items: vec![],
            confidence: 0.95,
            method: ExtractionMethod::Template,
            review: vec![],
            embedding: EmbeddingStatus::Pending,
            content_hash: "abc".to_string(),
            parsed_at: Utc::now(),
        }
    }

    #[test]
    fn test_canonical_text_layout() {
        let text = canonical_text(&record());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Invoice Information:");
        assert_eq!(lines[1], "Vendor: Amazon Web Services, Inc. (amazon-web-services)");
        assert_eq!(lines[2], "Category: Cloud Services");
        assert_eq!(lines[3], "Amount: $120.00");
        assert_eq!(lines[4], "Date: 2025-06-01");
        assert_eq!(lines[5], "Invoice Number: INV-42");
        assert_eq!(lines[6], "Recurring: Yes");
        assert_eq!(lines[7], "Purchaser: N/A");
    }

    #[test]
    fn test_canonical_text_is_deterministic() {
        assert_eq!(canonical_text(&record()), canonical_text(&record()));
    }

    #[test]
    fn test_text_hash_changes_with_content() {
        let mut other = record();
        other.category = "Other".to_string();

        let a = text_hash(&canonical_text(&record()));
        let b = text_hash(&canonical_text(&other));
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
