//! Vendor name cleaning and static alias resolution.

use std::sync::OnceLock;

use regex::Regex;

/// Canonical name used when a document carries no vendor at all.
pub const UNKNOWN_VENDOR: &str = "Unknown Vendor";

/// Well-known vendor abbreviations, keyed by cleaned uppercase name.
const ALIAS_MAP: &[(&str, &str)] = &[
    ("AMZN", "Amazon"),
    ("AMAZON", "Amazon"),
    ("AMAZONCOM", "Amazon"),
    ("AWS", "Amazon Web Services"),
    ("AMAZON WEB SERVICES", "Amazon Web Services"),
    ("MSFT", "Microsoft"),
    ("MICROSOFT", "Microsoft"),
    ("GOOG", "Google"),
    ("GOOGLE", "Google"),
    ("GOOGLE CLOUD", "Google Cloud Platform"),
    ("GCP", "Google Cloud Platform"),
    ("AAPL", "Apple"),
    ("APPLE", "Apple"),
    ("META", "Meta"),
    ("FACEBOOK", "Meta"),
    ("FB", "Meta"),
];

fn suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s+(INC|LLC|LTD|CORP|CO|CORPORATION|LIMITED)\.?$")
            .expect("suffix regex is valid")
    })
}

fn punctuation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s-]").expect("punctuation regex is valid"))
}

/// Clean a raw vendor name: strip a trailing legal suffix, drop punctuation
/// except spaces and hyphens, collapse whitespace, title-case.
pub fn clean_name(raw: &str) -> String {
    let without_suffix = suffix_regex().replace(raw.trim(), "");
    let without_punct = punctuation_regex().replace_all(&without_suffix, "");
    let collapsed = without_punct.split_whitespace().collect::<Vec<_>>().join(" ");
    title_case(&collapsed)
}

/// Title-case: uppercase every letter that follows a non-letter, lowercase
/// the rest ("3m" -> "3M", "jean-luc" -> "Jean-Luc").
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

/// Exact lookup in the static alias map by cleaned uppercase name.
pub fn lookup_alias(cleaned: &str) -> Option<&'static str> {
    let upper = cleaned.to_uppercase();
    ALIAS_MAP
        .iter()
        .find(|(key, _)| *key == upper)
        .map(|(_, canonical)| *canonical)
}

/// Infer a coarse category for a newly created vendor from its name.
pub fn infer_category(canonical_name: &str) -> Option<String> {
    let upper = canonical_name.to_uppercase();

    let category = if ["AWS", "CLOUD", "AZURE", "GCP"]
        .iter()
        .any(|t| upper.contains(t))
    {
        "Cloud Services"
    } else if ["OFFICE", "MICROSOFT", "SOFTWARE"]
        .iter()
        .any(|t| upper.contains(t))
    {
        "Software"
    } else if ["AMAZON", "SUPPLIES"].iter().any(|t| upper.contains(t)) {
        "Office Supplies"
    } else if ["TELECOM", "VERIZON", "PHONE"].iter().any(|t| upper.contains(t)) {
        "Telecommunications"
    } else {
        return None;
    };

    Some(category.to_string())
}
