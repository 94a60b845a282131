//! Deterministic template matching.
//!
//! A template names a vendor, the keywords that identify its invoices, and
//! regex capture patterns for the document number, date and amount. All
//! keywords must appear for a template to apply; the amount pattern must
//! capture or the template does not match at all.
//!
//! Templates come from three places: a small built-in set, TOML files in
//! the template directory, and templates learned from successful generative
//! extractions (so each vendor's second invoice parses without a provider
//! call).

use std::path::PathBuf;
use std::sync::RwLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use invodex_types::{vendor_id_for, ExtractedFields, DEFAULT_CATEGORY};

use crate::error::ExtractError;
use crate::pipeline::TEMPLATE_CONFIDENCE as FULL_MATCH_CONFIDENCE;

/// Penalty per optional field (document number, date) the template failed
/// to capture.
const MISSING_FIELD_PENALTY: f32 = 0.1;

/// Generic field patterns used for learned templates.
const GENERIC_DOCUMENT_NUMBER: &str =
    r"(?i)(?:invoice|order|receipt)\s*(?:number|no\.?|#)?\s*[:#]?\s*([A-Za-z0-9][A-Za-z0-9-]+)";
const GENERIC_DATE: &str = r"(?i)(?:invoice\s+)?date\s*[:]?\s*([0-9][0-9/\-]+)";
const GENERIC_AMOUNT: &str =
    r"(?i)(?:total|amount|balance)(?:\s+due)?\s*[:]?\s*\$?\s*([\d,]+\.\d{2})";

/// Field capture patterns. `amount` is mandatory; a template that cannot
/// capture an amount never matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateFields {
    #[serde(default)]
    pub document_number: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    pub amount: String,
}

/// One vendor's invoice layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub issuer: String,
    /// All keywords must appear (case-insensitive) in the document text.
    pub keywords: Vec<String>,
    pub fields: TemplateFields,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub currency: Option<String>,
}

struct Compiled {
    template: Template,
    amount: Regex,
    document_number: Option<Regex>,
    date: Option<Regex>,
}

fn compile(template: Template) -> Result<Compiled, ExtractError> {
    let compile_one = |pattern: &str| {
        Regex::new(pattern)
            .map_err(|e| ExtractError::Template(format!("{}: {}", template.issuer, e)))
    };
    let amount = compile_one(&template.fields.amount)?;
    let document_number = template
        .fields
        .document_number
        .as_deref()
        .map(compile_one)
        .transpose()?;
    let date = template.fields.date.as_deref().map(compile_one).transpose()?;

    Ok(Compiled {
        template,
        amount,
        document_number,
        date,
    })
}

fn capture(regex: &Regex, text: &str) -> Option<String> {
    regex
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace([',', '$'], "").trim().parse().ok()
}

/// Template library.
pub struct TemplateStore {
    dir: Option<PathBuf>,
    templates: RwLock<Vec<Compiled>>,
}

impl TemplateStore {
    /// Built-in templates for vendors common enough to ship with.
    pub fn builtin() -> Vec<Template> {
        vec![Template {
            issuer: "Amazon Web Services".to_string(),
            keywords: vec!["Amazon Web Services".to_string()],
            fields: TemplateFields {
                document_number: Some(GENERIC_DOCUMENT_NUMBER.to_string()),
                date: Some(GENERIC_DATE.to_string()),
                amount: GENERIC_AMOUNT.to_string(),
            },
            category: Some("Software/SaaS".to_string()),
            is_recurring: true,
            currency: Some("USD".to_string()),
        }]
    }

    /// Open a store over a template directory, loading built-ins plus every
    /// `*.toml` file in the directory (sorted by file name).
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ExtractError> {
        let dir = dir.into();
        let mut templates = Vec::new();

        for template in Self::builtin() {
            templates.push(compile(template)?);
        }

        if dir.is_dir() {
            let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
                .collect();
            paths.sort();

            for path in paths {
                let raw = std::fs::read_to_string(&path)?;
                match toml::from_str::<Template>(&raw) {
                    Ok(template) => templates.push(compile(template)?),
                    Err(e) => {
                        // One bad file must not take the library down.
                        warn!(path = ?path, error = %e, "Skipping unparseable template");
                    }
                }
            }
        }

        info!(count = templates.len(), dir = ?dir, "Loaded extraction templates");
        Ok(Self {
            dir: Some(dir),
            templates: RwLock::new(templates),
        })
    }

    /// Store with built-ins only and no persistence (tests, ephemeral use).
    pub fn in_memory() -> Self {
        let templates = Self::builtin()
            .into_iter()
            .map(|t| compile(t).expect("built-in templates compile"))
            .collect();
        Self {
            dir: None,
            templates: RwLock::new(templates),
        }
    }

    pub fn len(&self) -> usize {
        self.templates.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any template already covers a vendor.
    pub fn has_template_for(&self, vendor: &str) -> bool {
        let Ok(templates) = self.templates.read() else {
            return false;
        };
        templates
            .iter()
            .any(|c| c.template.issuer.eq_ignore_ascii_case(vendor.trim()))
    }

    /// Try every template in order; first match wins.
    ///
    /// Returns the extracted fields and the match confidence.
    pub fn match_text(&self, text: &str) -> Option<(ExtractedFields, f32)> {
        let lowered = text.to_lowercase();
        let templates = self.templates.read().ok()?;

        for compiled in templates.iter() {
            let all_keywords = compiled
                .template
                .keywords
                .iter()
                .all(|k| lowered.contains(&k.to_lowercase()));
            if !all_keywords {
                continue;
            }

            let Some(amount) = capture(&compiled.amount, text).and_then(|a| parse_amount(&a))
            else {
                continue;
            };

            let document_number = compiled
                .document_number
                .as_ref()
                .and_then(|re| capture(re, text));
            let date = compiled.date.as_ref().and_then(|re| capture(re, text));

            let mut confidence = FULL_MATCH_CONFIDENCE;
            if compiled.document_number.is_some() && document_number.is_none() {
                confidence -= MISSING_FIELD_PENALTY;
            }
            if compiled.date.is_some() && date.is_none() {
                confidence -= MISSING_FIELD_PENALTY;
            }

            let fields = ExtractedFields {
                vendor: compiled.template.issuer.clone(),
                document_number,
                date,
                total_amount: amount,
                currency: compiled
                    .template
                    .currency
                    .clone()
                    .unwrap_or_else(|| "USD".to_string()),
                category: compiled
                    .template
                    .category
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
                purchaser: None,
                is_recurring: compiled.template.is_recurring,
                line_items: vec![],
            };

            debug!(issuer = %fields.vendor, confidence = confidence, "Template matched");
            return Some((fields, confidence));
        }

        None
    }

    /// Learn a template from a successful generative extraction.
    ///
    /// The vendor name becomes the keyword and the field patterns are the
    /// generic ones, so the vendor's next invoice parses deterministically.
    /// Returns false when there is nothing to learn (no usable vendor, or a
    /// template already exists).
    pub fn learn(&self, fields: &ExtractedFields) -> Result<bool, ExtractError> {
        let vendor = fields.vendor.trim();
        if vendor.is_empty() || vendor.eq_ignore_ascii_case("unknown vendor") {
            return Ok(false);
        }
        if self.has_template_for(vendor) {
            return Ok(false);
        }

        let template = Template {
            issuer: vendor.to_string(),
            keywords: vec![vendor.to_string()],
            fields: TemplateFields {
                document_number: Some(GENERIC_DOCUMENT_NUMBER.to_string()),
                date: Some(GENERIC_DATE.to_string()),
                amount: GENERIC_AMOUNT.to_string(),
            },
            category: Some(fields.category.clone()),
            is_recurring: fields.is_recurring,
            currency: Some(fields.currency.clone()),
        };

        if let Some(dir) = &self.dir {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!("{}.toml", vendor_id_for(vendor)));
            let serialized = toml::to_string_pretty(&template)
                .map_err(|e| ExtractError::Template(e.to_string()))?;
            std::fs::write(&path, serialized)?;
            info!(vendor = vendor, path = ?path, "Learned template");
        } else {
            info!(vendor = vendor, "Learned template (in-memory)");
        }

        let compiled = compile(template)?;
        self.templates
            .write()
            .map_err(|e| ExtractError::Template(e.to_string()))?
            .push(compiled);
        Ok(true)
    }
}
