//! Tolerant JSON extraction from generative model responses.
//!
//! Models wrap JSON in markdown fences or prose despite being told not to.
//! Strip the wrapping, take the outermost object, and parse that.

use serde_json::Value;

/// Extract the first JSON object embedded in free text.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let cleaned = strip_fences(text.trim());

    // Fast path: the whole thing is JSON.
    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        if value.is_object() {
            return Some(value);
        }
    }

    // Otherwise take the outermost brace span.
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&cleaned[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// Remove a surrounding markdown code fence, if any.
fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").map(str::trim_end).unwrap_or(rest)
}
