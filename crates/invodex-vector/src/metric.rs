//! Distance metrics.

use serde::{Deserialize, Serialize};
use usearch::MetricKind;

use crate::error::VectorError;

/// Similarity metric for one index. Selected per deployment and applied
/// consistently within an index; changing it means rebuilding.
///
/// All metrics are exposed as distances: lower = more similar, ascending
/// order everywhere. Cosine distance ranges over [0, 2].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
    InnerProduct,
}

impl DistanceMetric {
    /// Parse the configuration string form.
    pub fn parse(s: &str) -> Result<Self, VectorError> {
        match s {
            "cosine" => Ok(DistanceMetric::Cosine),
            "l2" => Ok(DistanceMetric::L2),
            "ip" => Ok(DistanceMetric::InnerProduct),
            other => Err(VectorError::UnknownMetric(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
            DistanceMetric::InnerProduct => "ip",
        }
    }

    /// usearch metric kind. usearch already reports these as ascending
    /// distances (Cos = 1 - cosine similarity).
    pub fn to_usearch(self) -> MetricKind {
        match self {
            DistanceMetric::Cosine => MetricKind::Cos,
            DistanceMetric::L2 => MetricKind::L2sq,
            DistanceMetric::InnerProduct => MetricKind::IP,
        }
    }
}
