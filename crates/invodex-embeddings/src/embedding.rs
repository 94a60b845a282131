//! Embedding vector type.

use crate::error::EmbeddingError;

/// Vector embedding - a normalized float array.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The embedding vector (normalized to unit length)
    pub values: Vec<f32>,
}

impl Embedding {
    /// Create a new embedding from a vector.
    /// Normalizes the vector to unit length.
    pub fn new(values: Vec<f32>) -> Self {
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let normalized = if norm > 0.0 {
            values.iter().map(|x| x / norm).collect()
        } else {
            values
        };
        Self { values: normalized }
    }

    /// Create embedding without normalization (for pre-normalized vectors)
    pub fn from_normalized(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Get the embedding dimension
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Compute cosine similarity with another embedding.
    /// Returns value in [-1, 1] range (1 = identical).
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return 0.0;
        }
        // Since both are normalized, dot product = cosine similarity
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum()
    }

    /// Serialize as a fixed-length sequence of little-endian IEEE-754 f32
    /// components. This is the persisted wire form for vectors.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.values.len() * 4);
        for v in &self.values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    /// Decode from the little-endian byte form, checking the expected
    /// dimension.
    pub fn from_le_bytes(bytes: &[u8], dimension: usize) -> Result<Self, EmbeddingError> {
        if bytes.len() != dimension * 4 {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: bytes.len() / 4,
            });
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self::from_normalized(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_normalization() {
        let emb = Embedding::new(vec![3.0, 4.0]);
        // 3-4-5 triangle: normalized should be [0.6, 0.8]
        assert!((emb.values[0] - 0.6).abs() < 0.001);
        assert!((emb.values[1] - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let emb1 = Embedding::new(vec![1.0, 0.0, 0.0]);
        let emb2 = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((emb1.cosine_similarity(&emb2) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let emb1 = Embedding::new(vec![1.0, 0.0]);
        let emb2 = Embedding::new(vec![0.0, 1.0]);
        assert!(emb1.cosine_similarity(&emb2).abs() < 0.001);
    }

    #[test]
    fn test_byte_codec_roundtrip() {
        let emb = Embedding::new(vec![0.25, -0.5, 0.75, 1.0]);
        let bytes = emb.to_le_bytes();
        assert_eq!(bytes.len(), 16);

        let decoded = Embedding::from_le_bytes(&bytes, 4).unwrap();
        assert_eq!(emb, decoded);
    }

    #[test]
    fn test_byte_codec_rejects_wrong_dimension() {
        let emb = Embedding::new(vec![1.0, 0.0]);
        let bytes = emb.to_le_bytes();
        let result = Embedding::from_le_bytes(&bytes, 3);
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }
}
