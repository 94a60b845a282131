//! The extraction state machine.
//!
//! Pending -> TemplateAttempt -> {TemplateSuccess | TemplateFailure}
//!         -> [GenerativeAttempt ->] Validate -> {Accepted | Rejected}
//!
//! The fallback chain is explicit data: every attempt lands in the report
//! with its stage, outcome and reason, and the terminal outcome is an enum,
//! not an exception.

use std::sync::Arc;

use tracing::{debug, info, warn};

use invodex_types::{ExtractedFields, ExtractionMethod, RejectReason, ReviewReason};

use crate::generative::FieldExtractor;
use crate::template::TemplateStore;
use crate::text::extract_text;
use crate::validate::validate_fields;

/// Confidence of a full template match.
pub const TEMPLATE_CONFIDENCE: f32 = 0.95;

/// Confidence granted to generative extractions.
pub const GENERATIVE_CONFIDENCE: f32 = 0.85;

/// Demotion applied when validation flags a consistency problem.
const CONSISTENCY_DEMOTION: f32 = 0.1;

/// Pipeline stage an attempt ran in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Template,
    Generative,
}

/// One extraction attempt, successful or not.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub stage: Stage,
    pub succeeded: bool,
    pub confidence: Option<f32>,
    pub detail: String,
}

/// Terminal pipeline outcome.
#[derive(Debug)]
pub enum Outcome {
    Accepted {
        fields: ExtractedFields,
        method: ExtractionMethod,
        confidence: f32,
        review: Vec<ReviewReason>,
    },
    Rejected(RejectReason),
}

/// Full run report: every attempt plus the outcome.
#[derive(Debug)]
pub struct ExtractionReport {
    pub attempts: Vec<Attempt>,
    pub outcome: Outcome,
}

/// Two-stage extraction pipeline.
pub struct ExtractionPipeline {
    templates: Arc<TemplateStore>,
    generative: Option<Arc<dyn FieldExtractor>>,
    confidence_threshold: f32,
}

impl ExtractionPipeline {
    pub fn new(templates: Arc<TemplateStore>, confidence_threshold: f32) -> Self {
        Self {
            templates,
            generative: None,
            confidence_threshold,
        }
    }

    pub fn with_generative(mut self, extractor: Arc<dyn FieldExtractor>) -> Self {
        self.generative = Some(extractor);
        self
    }

    /// Run the full state machine over a document's bytes.
    pub async fn run(&self, bytes: &[u8]) -> ExtractionReport {
        let mut attempts = Vec::new();

        // Unreadable input is rejected before any attempt runs.
        let Some(text) = extract_text(bytes) else {
            return ExtractionReport {
                attempts,
                outcome: Outcome::Rejected(RejectReason::Unreadable),
            };
        };

        // Template stage.
        let template_result = self.templates.match_text(&text);
        match &template_result {
            Some((fields, confidence)) => {
                attempts.push(Attempt {
                    stage: Stage::Template,
                    succeeded: true,
                    confidence: Some(*confidence),
                    detail: format!("matched template for {}", fields.vendor),
                });
            }
            None => {
                attempts.push(Attempt {
                    stage: Stage::Template,
                    succeeded: false,
                    confidence: None,
                    detail: "no template matched".to_string(),
                });
            }
        }

        if let Some((fields, confidence)) = &template_result {
            if *confidence >= self.confidence_threshold {
                // Confident template match: the generative call is skipped
                // entirely, which is the cost and latency win templates buy.
                debug!(vendor = %fields.vendor, confidence = confidence, "Template match above threshold");
                let outcome =
                    self.validate(fields.clone(), ExtractionMethod::Template, *confidence);
                return ExtractionReport { attempts, outcome };
            }
        }

        // Generative stage.
        let mut provider_failure: Option<String> = None;
        if let Some(extractor) = &self.generative {
            match extractor.extract(&text).await {
                Ok(fields) => {
                    attempts.push(Attempt {
                        stage: Stage::Generative,
                        succeeded: true,
                        confidence: Some(GENERATIVE_CONFIDENCE),
                        detail: format!("extractor {}", extractor.id()),
                    });
                    info!(vendor = %fields.vendor, extractor = extractor.id(), "Generative extraction succeeded");

                    // Learn a template so this vendor's next document parses
                    // deterministically. Best effort only.
                    if let Err(e) = self.templates.learn(&fields) {
                        warn!(error = %e, "Template learning failed");
                    }

                    let outcome =
                        self.validate(fields, ExtractionMethod::Generative, GENERATIVE_CONFIDENCE);
                    return ExtractionReport { attempts, outcome };
                }
                Err(e) => {
                    attempts.push(Attempt {
                        stage: Stage::Generative,
                        succeeded: false,
                        confidence: None,
                        detail: e.to_string(),
                    });
                    provider_failure = Some(e.to_string());
                }
            }
        }

        // Generative unavailable or not configured: a sub-threshold template
        // result is still better than nothing.
        if let Some((fields, confidence)) = template_result {
            let outcome = self.validate(fields, ExtractionMethod::Template, confidence);
            return ExtractionReport { attempts, outcome };
        }

        let reason = provider_failure
            .unwrap_or_else(|| "no generative extractor configured".to_string());
        ExtractionReport {
            attempts,
            outcome: Outcome::Rejected(RejectReason::ExtractionUnavailable { reason }),
        }
    }

    /// Validate stage: reject only when vendor, amount and date are all
    /// absent; otherwise accept with demoted confidence and review flags.
    fn validate(
        &self,
        fields: ExtractedFields,
        method: ExtractionMethod,
        confidence: f32,
    ) -> Outcome {
        let validation = validate_fields(&fields);

        if validation.mandatory_fields_all_absent() {
            return Outcome::Rejected(RejectReason::MissingMandatoryFields {
                missing: validation.missing,
            });
        }

        let mut review = validation.review;
        let mut confidence = confidence;
        if !review.is_empty() {
            confidence = (confidence - CONSISTENCY_DEMOTION).max(0.1);
        }
        if confidence < self.confidence_threshold {
            review.push(ReviewReason::LowConfidence { confidence });
        }

        Outcome::Accepted {
            fields,
            method,
            confidence,
            review,
        }
    }
}
