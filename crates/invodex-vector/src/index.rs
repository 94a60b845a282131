//! Search result types.

use serde::{Deserialize, Serialize};

/// One similarity hit. `distance` is ascending: lower = more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub record_id: String,
    pub distance: f32,
}

impl SearchHit {
    pub fn new(record_id: impl Into<String>, distance: f32) -> Self {
        Self {
            record_id: record_id.into(),
            distance,
        }
    }
}

/// Ordered similarity results: ascending distance, ties broken by record id.
pub type SimilarityResult = Vec<SearchHit>;

/// Index statistics for one provider partition.
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub provider_id: String,
    /// Vectors currently in the ANN index (may lag the store until the next
    /// rebuild).
    pub indexed_count: usize,
    /// Vectors persisted in the store.
    pub stored_count: usize,
    pub dimension: usize,
}
