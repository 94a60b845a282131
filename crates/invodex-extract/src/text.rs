//! Document text acquisition.
//!
//! The core works on text payloads; rendering formats (PDF, images + OCR)
//! are decoded by an upstream collaborator. A byte stream that is not valid
//! UTF-8, or contains nothing but whitespace, has no extractable text and
//! is rejected before either extraction stage runs.

/// Extractable text of a document, or None when there is none.
pub fn extract_text(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;
    if text.trim().is_empty() {
        return None;
    }
    Some(text.to_string())
}
