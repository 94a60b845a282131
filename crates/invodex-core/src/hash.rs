//! Document content hashing.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a document's raw bytes: the identity key for the
/// parse cache and submit idempotence. A different byte stream is a
/// different document.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(content_hash(b"invoice"), content_hash(b"invoice"));
    }

    #[test]
    fn test_different_bytes_different_hash() {
        assert_ne!(content_hash(b"invoice"), content_hash(b"invoice "));
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = content_hash(b"");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
