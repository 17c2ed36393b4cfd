//! Geometric similarity between a live pose and stored references.

use serde::{Deserialize, Serialize};

use sign_core::{mean_point_distance, Landmark, ModelId, StoredSample, LANDMARK_COUNT};

use crate::samples::SampleStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// References fetched per comparison
    pub max_references: usize,
    /// Mean distance is multiplied by this before subtracting from 1
    pub distance_scale: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            max_references: 5,
            distance_scale: 10.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimilarityScorer {
    config: SimilarityConfig,
}

impl SimilarityScorer {
    pub fn new(config: SimilarityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// `clamp(1 - mean_distance * scale, 0, 1)`; 0 unless both poses are
    /// complete.
    pub fn landmark_similarity(&self, a: &[Landmark], b: &[Landmark]) -> f64 {
        if a.len() != LANDMARK_COUNT || b.len() != LANDMARK_COUNT {
            return 0.0;
        }
        match mean_point_distance(a, b) {
            Some(d) if d.is_finite() => (1.0 - d * self.config.distance_scale).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }

    /// Best similarity against any reference. Unparseable references are
    /// skipped.
    pub fn best_similarity(&self, live: &[Landmark], references: &[StoredSample]) -> f64 {
        references
            .iter()
            .filter_map(|r| r.parsed_landmarks().ok())
            .map(|points| self.landmark_similarity(live, &points))
            .fold(0.0, f64::max)
    }

    /// Similarity against the stored references of `label`. Lookup failures
    /// score 0.
    pub async fn score(
        &self,
        samples: &dyn SampleStore,
        model_id: &ModelId,
        label: &str,
        live: &[Landmark],
    ) -> f64 {
        match samples
            .samples_for_label(model_id, label, self.config.max_references)
            .await
        {
            Ok(references) => self.best_similarity(live, &references),
            Err(e) => {
                tracing::warn!("Reference lookup for {}/{} failed: {}", model_id, label, e);
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::InMemorySampleStore;

    fn pose(offset: f64) -> Vec<Landmark> {
        (0..21)
            .map(|i| Landmark::new(0.4 + offset + i as f64 * 0.01, 0.6, 0.0))
            .collect()
    }

    #[test]
    fn test_identical_poses_are_fully_similar() {
        let scorer = SimilarityScorer::default();
        assert_eq!(scorer.landmark_similarity(&pose(0.0), &pose(0.0)), 1.0);
    }

    #[test]
    fn test_similarity_decays_with_distance() {
        let scorer = SimilarityScorer::default();
        let near = scorer.landmark_similarity(&pose(0.0), &pose(0.02));
        assert!((near - 0.8).abs() < 1e-9);
        assert_eq!(scorer.landmark_similarity(&pose(0.0), &pose(0.5)), 0.0);
        assert_eq!(scorer.landmark_similarity(&pose(0.0), &pose(0.0)[..20]), 0.0);
    }

    #[test]
    fn test_best_over_references_skips_broken() {
        let scorer = SimilarityScorer::default();
        let mut broken = StoredSample::from_landmarks("a", &pose(0.0));
        broken.landmarks = serde_json::json!("garbage");
        let refs = vec![
            broken,
            StoredSample::from_landmarks("a", &pose(0.05)),
            StoredSample::from_landmarks("a", &pose(0.01)),
        ];
        let best = scorer.best_similarity(&pose(0.0), &refs);
        assert!((best - 0.9).abs() < 1e-9);
        assert_eq!(scorer.best_similarity(&pose(0.0), &[]), 0.0);
    }

    #[tokio::test]
    async fn test_score_uses_target_label_only() {
        let store = InMemorySampleStore::new();
        let id = ModelId::new("m");
        store.add_landmarks(&id, "a", &pose(0.0));
        store.add_landmarks(&id, "b", &pose(0.3));

        let scorer = SimilarityScorer::default();
        assert_eq!(scorer.score(&store, &id, "a", &pose(0.0)).await, 1.0);
        assert_eq!(scorer.score(&store, &id, "b", &pose(0.0)).await, 0.0);
        assert_eq!(scorer.score(&store, &id, "missing", &pose(0.0)).await, 0.0);
    }
}
