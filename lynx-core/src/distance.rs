//! Distance metrics for vector similarity computations.
//!
//! All metrics are normalized so that lower values mean more similar:
//! dot product is negated, cosine is reported as `1 - similarity`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported distance metrics for vector similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean (L2) distance. Lower is more similar.
    L2,
    /// Cosine distance (1 - cosine similarity). Lower is more similar.
    Cosine,
    /// Dot product, negated internally so lower = more similar.
    DotProduct,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        Self::L2
    }
}

impl DistanceMetric {
    /// Computes the public distance between two vectors using this metric.
    ///
    /// For [`DistanceMetric::L2`] this includes the final square root so
    /// values are comparable across index types.
    #[inline]
    pub fn compute(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len(), "vector dimensions must match");

        match self {
            DistanceMetric::L2 => l2_distance(a, b),
            DistanceMetric::Cosine => cosine_distance(a, b),
            DistanceMetric::DotProduct => -dot_product(a, b),
        }
    }

    /// Computes an ordering-preserving distance for inner loops.
    ///
    /// Identical to [`compute`](Self::compute) except that L2 skips the
    /// final square root. Callers must pass the result through
    /// [`finalize`](Self::finalize) before reporting it.
    #[inline]
    pub fn compute_fast(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len(), "vector dimensions must match");

        match self {
            DistanceMetric::L2 => l2_distance_squared(a, b),
            DistanceMetric::Cosine => cosine_distance(a, b),
            DistanceMetric::DotProduct => -dot_product(a, b),
        }
    }

    /// Converts a [`compute_fast`](Self::compute_fast) value into the
    /// public distance.
    #[inline]
    pub fn finalize(&self, fast: f32) -> f32 {
        match self {
            DistanceMetric::L2 => fast.sqrt(),
            _ => fast,
        }
    }

    /// Wire encoding used by the persistence format.
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            DistanceMetric::L2 => 0,
            DistanceMetric::Cosine => 1,
            DistanceMetric::DotProduct => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(DistanceMetric::L2),
            1 => Ok(DistanceMetric::Cosine),
            2 => Ok(DistanceMetric::DotProduct),
            _ => Err(Error::IndexCorrupted(format!(
                "invalid distance metric tag: {}",
                value
            ))),
        }
    }
}

/// Computes Euclidean (L2) distance: `sqrt(sum((a[i] - b[i])^2))`.
#[inline]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    l2_distance_squared(a, b).sqrt()
}

/// Computes squared Euclidean distance (avoids the sqrt for comparisons).
#[inline]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Computes cosine distance: `1 - (a . b) / (||a|| * ||b||)`.
///
/// Returns 1.0 when either vector has zero norm.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    let denominator = norm_a * norm_b;
    if denominator == 0.0 {
        return 1.0;
    }

    1.0 - (dot / denominator)
}

/// Computes the dot product: `sum(a[i] * b[i])`.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
