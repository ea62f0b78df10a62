//! Similarity metrics

use serde::{Deserialize, Serialize};

/// Distance metric used to score query hits.
///
/// Every metric is normalized to "higher is closer" so callers can sort
/// hits uniformly regardless of the configured metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Cosine similarity, the default for text embeddings
    #[default]
    Cosine,
    /// Euclidean distance mapped to `1 / (1 + d)`
    Euclidean,
    /// Raw dot product
    Dot,
}

impl Metric {
    /// Score two vectors under this metric, higher is closer
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine_similarity(a, b),
            Metric::Euclidean => 1.0 / (1.0 + euclidean_distance(a, b)),
            Metric::Dot => dot_product(a, b),
        }
    }
}

/// Cosine similarity between two vectors of equal length.
///
/// A zero vector has no direction; similarity against it is defined as 0.0
/// so that empty-text embeddings rank last instead of erroring.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Euclidean distance between two vectors of equal length
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Dot product of two vectors of equal length
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors() {
        let v = vec![0.5, -0.2, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_opposite_vectors() {
        let a = vec![1.0, 2.0];
        let b = vec![-1.0, -2.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_is_zero_similarity() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 2.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_euclidean_score_is_higher_for_closer_vectors() {
        let q = vec![1.0, 1.0];
        let near = vec![1.0, 1.1];
        let far = vec![5.0, -3.0];
        assert!(Metric::Euclidean.score(&q, &near) > Metric::Euclidean.score(&q, &far));
        assert!((Metric::Euclidean.score(&q, &q) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dot_product() {
        assert_eq!(dot_product(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
        assert_eq!(Metric::Dot.score(&[1.0, 0.0], &[2.0, 9.0]), 2.0);
    }
}
