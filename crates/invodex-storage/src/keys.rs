//! Key construction for non-trivial column families.

use invodex_types::record::CacheEntry;

/// Embedding-cache key: text hash, provider and encode mode together, since
/// vectors for the same text differ across providers and across modes.
pub fn embed_cache_key(text_hash: &str, provider_id: &str, mode: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(text_hash.len() + provider_id.len() + mode.len() + 2);
    key.extend_from_slice(text_hash.as_bytes());
    key.push(b':');
    key.extend_from_slice(provider_id.as_bytes());
    key.push(b':');
    key.extend_from_slice(mode.as_bytes());
    key
}

/// Parse-cache key for a content hash (hash + extractor version).
pub fn parse_cache_key(content_hash: &str) -> Vec<u8> {
    CacheEntry::key_for(content_hash).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_cache_key_separates_modes() {
        let doc = embed_cache_key("abc", "bge-local", "document");
        let query = embed_cache_key("abc", "bge-local", "query");
        assert_ne!(doc, query);
    }

    #[test]
    fn test_embed_cache_key_separates_providers() {
        let a = embed_cache_key("abc", "bge-local", "document");
        let b = embed_cache_key("abc", "openai-api", "document");
        assert_ne!(a, b);
    }
}
