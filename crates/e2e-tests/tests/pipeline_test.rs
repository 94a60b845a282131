//! End-to-end ingestion tests: cache idempotence, rejection paths, review
//! flags and vendor aliasing across the full submit flow.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use e2e_tests::{build_service, fields, line_item, ScriptedExtractor, TokenHashProvider};
use invodex_core::CoreError;
use invodex_types::{EmbeddingStatus, ExtractedFields, ExtractionMethod, RejectReason, ReviewReason};

const CONTOSO_DOC: &[u8] = b"Contoso Catering ref 881, sum forty-five dollars\n";

fn contoso_extractor() -> Arc<ScriptedExtractor> {
    Arc::new(ScriptedExtractor::new(vec![(
        "Contoso Catering",
        fields(
            "Contoso Catering",
            "CC-881",
            "05/02/2025",
            45.0,
            "Travel & Entertainment",
            false,
        ),
    )]))
}

#[tokio::test]
async fn test_resubmission_hits_cache_with_zero_extractor_calls() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(TokenHashProvider::new("mock"));
    let extractor = contoso_extractor();
    let service = build_service(&temp, provider, Some(extractor.clone()));

    let first = service.submit(CONTOSO_DOC).await.unwrap();
    assert!(!first.cache_hit);
    assert_eq!(first.method, ExtractionMethod::Generative);
    assert_eq!(extractor.call_count(), 1);

    // Byte-identical resubmission: same record, no extractor call.
    let second = service.submit(CONTOSO_DOC).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.record_id, first.record_id);
    assert_eq!(second.confidence, first.confidence);
    assert_eq!(extractor.call_count(), 1);

    assert_eq!(service.records().unwrap().len(), 1);
    let vendors = service.vendors().unwrap();
    assert_eq!(vendors.len(), 1);
    assert_eq!(vendors[0].record_count, 1);
}

#[tokio::test]
async fn test_unscripted_document_rejected_as_unavailable() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(TokenHashProvider::new("mock"));
    let service = build_service(&temp, provider, Some(contoso_extractor()));

    let err = service
        .submit(b"Totally unknown vendor paperwork\n")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Rejected(RejectReason::ExtractionUnavailable { .. })
    ));
    assert!(service.records().unwrap().is_empty());
}

#[tokio::test]
async fn test_blank_document_rejected_as_unreadable() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(TokenHashProvider::new("mock"));
    let extractor = contoso_extractor();
    let service = build_service(&temp, provider, Some(extractor.clone()));

    let err = service.submit(b"   \n\t\n").await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Rejected(RejectReason::Unreadable)
    ));
    // Rejected before any attempt ran.
    assert_eq!(extractor.call_count(), 0);
}

#[tokio::test]
async fn test_mandatory_fields_all_absent_rejected() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(TokenHashProvider::new("mock"));
    let extractor = Arc::new(ScriptedExtractor::new(vec![(
        "mystery",
        ExtractedFields {
            vendor: "".to_string(),
            document_number: None,
            date: None,
            total_amount: 0.0,
            currency: "USD".to_string(),
            category: "Other".to_string(),
            purchaser: None,
            is_recurring: false,
            line_items: vec![],
        },
    )]));
    let service = build_service(&temp, provider, Some(extractor));

    let err = service.submit(b"mystery paperwork\n").await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Rejected(RejectReason::MissingMandatoryFields { .. })
    ));
}

#[tokio::test]
async fn test_line_item_sum_mismatch_is_flagged_not_rejected() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(TokenHashProvider::new("mock"));
    let mut mismatched = fields(
        "Contoso Catering",
        "CC-9",
        "05/03/2025",
        120.0,
        "Travel & Entertainment",
        false,
    );
    mismatched.line_items = vec![line_item("event catering", 119.99)];
    let extractor = Arc::new(ScriptedExtractor::new(vec![("Contoso", mismatched)]));
    let service = build_service(&temp, provider, Some(extractor));

    // Items sum to $119.99 against a stated $120.00.
    let receipt = service.submit(b"Contoso event paperwork\n").await.unwrap();

    let record = service.record(&receipt.record_id).unwrap().unwrap();
    assert_eq!(record.total_amount, 120.0);
    assert!(record
        .review
        .iter()
        .any(|r| matches!(r, ReviewReason::LineItemSumMismatch { .. })));
    assert!(matches!(record.embedding, EmbeddingStatus::Ready { .. }));
}

#[tokio::test]
async fn test_vendor_aliases_converge_and_strangers_stay_apart() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(TokenHashProvider::new("mock"));
    let extractor = Arc::new(ScriptedExtractor::new(vec![
        (
            "Seattle datacenter",
            fields(
                "Amazon Web Services, Inc.",
                "AWS-1",
                "06/01/2025",
                120.0,
                "Cloud",
                true,
            ),
        ),
        (
            "console charge",
            fields("AWS", "AWS-2", "06/15/2025", 80.0, "Cloud", true),
        ),
        (
            "catering slip",
            fields(
                "Contoso Catering",
                "CC-1",
                "06/20/2025",
                40.0,
                "Travel & Entertainment",
                false,
            ),
        ),
    ]));
    let service = build_service(&temp, provider, Some(extractor));

    let a = service.submit(b"Seattle datacenter bill\n").await.unwrap();
    let b = service.submit(b"console charge statement\n").await.unwrap();
    let c = service.submit(b"catering slip\n").await.unwrap();

    // "Amazon Web Services, Inc." and "AWS" resolve to one canonical vendor.
    assert_eq!(a.vendor_id, "amazon-web-services");
    assert_eq!(b.vendor_id, a.vendor_id);
    // A dissimilar vendor stays distinct.
    assert_ne!(c.vendor_id, a.vendor_id);

    let vendors = service.vendors().unwrap();
    assert_eq!(vendors.len(), 2);

    let aws = vendors
        .iter()
        .find(|v| v.id == "amazon-web-services")
        .unwrap();
    assert_eq!(aws.record_count, 2);
    assert!((aws.total_spent - 200.0).abs() < 1e-9);
    assert!(aws.aliases.contains("Amazon Web Services, Inc."));
    assert!(aws.aliases.contains("AWS"));
}
