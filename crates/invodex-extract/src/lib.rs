//! # invodex-extract
//!
//! Two-stage field extraction for scanned invoice documents.
//!
//! The pipeline is a small state machine: deterministic template matching
//! first, the generative extractor as fallback, then validation. Every
//! attempt and outcome is explicit data (`ExtractionReport`), not exception
//! flow. Templates are learned back from successful generative extractions,
//! so each vendor usually pays for one generative call ever.

pub mod dates;
pub mod error;
pub mod generative;
pub mod json;
pub mod pipeline;
pub mod template;
pub mod text;
pub mod validate;

pub use dates::{parse_date, DATE_FORMATS};
pub use error::ExtractError;
pub use generative::{ApiExtractor, ApiExtractorConfig, FieldExtractor};
pub use json::extract_json_object;
pub use pipeline::{
    Attempt, ExtractionPipeline, ExtractionReport, Outcome, Stage, GENERATIVE_CONFIDENCE,
    TEMPLATE_CONFIDENCE,
};
pub use template::{Template, TemplateFields, TemplateStore};
pub use text::extract_text;
pub use validate::{validate_fields, Validation};
