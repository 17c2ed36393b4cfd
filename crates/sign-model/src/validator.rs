//! Per-class gesture statistics persisted with each artifact.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Centroid and spread of every real class in standardized feature space,
/// plus the global mean and spread.
///
/// Kept for future quality checks. [`GestureValidator::validate`] accepts
/// everything for now and must never block a prediction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GestureValidator {
    pub centroids: BTreeMap<String, Vec<f32>>,
    pub spreads: BTreeMap<String, Vec<f32>>,
    pub global_mean: Vec<f32>,
    pub global_std: Vec<f32>,
}

impl GestureValidator {
    /// Build from standardized rows and their labels.
    pub fn build(rows: &[Vec<f32>], labels: &[String]) -> Self {
        let mut grouped: BTreeMap<&str, Vec<&[f32]>> = BTreeMap::new();
        for (row, label) in rows.iter().zip(labels) {
            grouped.entry(label.as_str()).or_default().push(row.as_slice());
        }

        let all: Vec<&[f32]> = rows.iter().map(|r| r.as_slice()).collect();
        let (global_mean, global_std) = mean_and_std(&all);

        let mut centroids = BTreeMap::new();
        let mut spreads = BTreeMap::new();
        for (label, group) in grouped {
            let (mean, std) = mean_and_std(&group);
            centroids.insert(label.to_string(), mean);
            spreads.insert(label.to_string(), std);
        }

        Self {
            centroids,
            spreads,
            global_mean,
            global_std,
        }
    }

    pub fn validate(&self, _features: &[f32]) -> bool {
        true
    }

    /// Euclidean distance from `features` to the centroid of `label`.
    pub fn distance_to_centroid(&self, label: &str, features: &[f32]) -> Option<f32> {
        let centroid = self.centroids.get(label)?;
        if centroid.len() != features.len() {
            return None;
        }
        let sq: f32 = centroid
            .iter()
            .zip(features)
            .map(|(c, f)| (c - f).powi(2))
            .sum();
        Some(sq.sqrt())
    }
}

fn mean_and_std(rows: &[&[f32]]) -> (Vec<f32>, Vec<f32>) {
    let Some(first) = rows.first() else {
        return (Vec::new(), Vec::new());
    };
    let dim = first.len();
    let n = rows.len() as f32;

    let mut mean = vec![0.0f32; dim];
    for row in rows {
        for (m, v) in mean.iter_mut().zip(row.iter()) {
            *m += v;
        }
    }
    for m in mean.iter_mut() {
        *m /= n;
    }

    let mut std = vec![0.0f32; dim];
    for row in rows {
        for ((s, v), m) in std.iter_mut().zip(row.iter()).zip(&mean) {
            *s += (v - m).powi(2);
        }
    }
    for s in std.iter_mut() {
        *s = (*s / n).sqrt();
    }

    (mean, std)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_per_class_centroids() {
        let rows = vec![vec![0.0, 0.0], vec![2.0, 2.0], vec![10.0, 10.0]];
        let labels = vec!["a".to_string(), "a".to_string(), "b".to_string()];
        let validator = GestureValidator::build(&rows, &labels);

        assert_eq!(validator.centroids["a"], vec![1.0, 1.0]);
        assert_eq!(validator.spreads["a"], vec![1.0, 1.0]);
        assert_eq!(validator.centroids["b"], vec![10.0, 10.0]);
        assert_eq!(validator.global_mean, vec![4.0, 4.0]);
        assert_eq!(validator.distance_to_centroid("b", &[10.0, 10.0]), Some(0.0));
        assert!(validator.distance_to_centroid("c", &[0.0, 0.0]).is_none());
    }

    #[test]
    fn test_validate_never_blocks() {
        let validator = GestureValidator::default();
        assert!(validator.validate(&[1e6, -1e6]));
    }
}
