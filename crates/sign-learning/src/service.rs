//! Practice-mode service tying classification, references and statistics
//! together.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use sign_core::{ComparisonResult, Landmark, ModelId, Result};
use sign_model::InferenceEngine;

use crate::feedback::{FeedbackConfig, FeedbackPolicy};
use crate::history::{ComparisonHistory, DEFAULT_HISTORY_CAPACITY};
use crate::reference::{ReferenceConfig, ReferenceSample, ReferenceSelector};
use crate::samples::SampleStore;
use crate::session::{
    LabelPerformance, ProgressUpdate, SessionKey, SessionStats, SessionStatsAggregator,
};
use crate::similarity::{SimilarityConfig, SimilarityScorer};

/// Learning-mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub feedback: FeedbackConfig,
    pub similarity: SimilarityConfig,
    pub reference: ReferenceConfig,
    /// Comparisons kept per session and label
    pub history_capacity: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            feedback: FeedbackConfig::default(),
            similarity: SimilarityConfig::default(),
            reference: ReferenceConfig::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

pub struct LearningService {
    inference: Arc<InferenceEngine>,
    samples: Arc<dyn SampleStore>,
    references: ReferenceSelector,
    similarity: SimilarityScorer,
    feedback: FeedbackPolicy,
    sessions: SessionStatsAggregator,
    history: ComparisonHistory,
}

impl LearningService {
    pub fn new(
        config: LearningConfig,
        inference: Arc<InferenceEngine>,
        samples: Arc<dyn SampleStore>,
    ) -> Self {
        Self {
            inference,
            samples,
            references: ReferenceSelector::new(config.reference),
            similarity: SimilarityScorer::new(config.similarity),
            feedback: FeedbackPolicy::new(config.feedback),
            sessions: SessionStatsAggregator::new(),
            history: ComparisonHistory::new(config.history_capacity),
        }
    }

    /// Best reference sample of every label of a model.
    pub async fn references(&self, model_id: &ModelId) -> Result<Vec<ReferenceSample>> {
        let samples = self.samples.samples_for_model(model_id).await?;
        Ok(self.references.references(&samples))
    }

    /// Score an attempt at `target`, recorded under the model alone.
    ///
    /// Never fails: any error yields [`ComparisonResult::error`].
    pub async fn compare_to_target(
        &self,
        model_id: &ModelId,
        landmarks: &[Landmark],
        target: &str,
    ) -> ComparisonResult {
        self.compare_for_session(&SessionKey::model(model_id.clone()), landmarks, target)
            .await
    }

    /// Score an attempt at `target` and record it in the session history.
    pub async fn compare_for_session(
        &self,
        key: &SessionKey,
        landmarks: &[Landmark],
        target: &str,
    ) -> ComparisonResult {
        match self.try_compare(&key.model_id, landmarks, target).await {
            Ok(result) => {
                self.history.record(key, target, result.clone()).await;
                result
            }
            Err(e) => {
                tracing::warn!("Comparison against '{}' failed for {}: {}", target, key, e);
                ComparisonResult::error(e)
            }
        }
    }

    async fn try_compare(
        &self,
        model_id: &ModelId,
        landmarks: &[Landmark],
        target: &str,
    ) -> Result<ComparisonResult> {
        let prediction = self.inference.predict(model_id, landmarks).await?;
        let confidence = prediction.confidence;

        let is_match = self
            .feedback
            .is_match(&prediction.prediction, target, confidence);
        let feedback = self
            .feedback
            .feedback(&prediction.prediction, target, confidence, is_match);
        let similarity = self
            .similarity
            .score(self.samples.as_ref(), model_id, target, landmarks)
            .await;
        let detection_quality = self.feedback.detection_quality(landmarks, confidence);

        Ok(ComparisonResult {
            prediction: prediction.prediction,
            confidence,
            is_match,
            feedback,
            similarity,
            timestamp: Utc::now(),
            detection_quality,
        })
    }

    pub async fn update_progress(&self, key: &SessionKey, update: &ProgressUpdate) -> SessionStats {
        self.sessions.update_progress(key, update).await
    }

    pub async fn session_stats(&self, key: &SessionKey) -> SessionStats {
        self.sessions.session_stats(key).await
    }

    pub async fn label_performance(&self, key: &SessionKey, label: &str) -> LabelPerformance {
        self.sessions.label_performance(key, label).await
    }

    pub async fn comparison_history(&self, key: &SessionKey, label: &str) -> Vec<ComparisonResult> {
        self.history.recent(key, label).await
    }

    /// Hard-delete statistics and comparison history of one session.
    pub async fn reset_progress(&self, key: &SessionKey) -> bool {
        let had_stats = self.sessions.reset(key).await;
        let had_history = self.history.reset(key).await > 0;
        tracing::info!("Reset progress for {}", key);
        had_stats || had_history
    }

    /// Drop every session and history entry of a model.
    pub async fn forget_model(&self, model_id: &ModelId) {
        self.sessions.reset_model(model_id).await;
        self.history.reset_model(model_id).await;
    }

    pub async fn clear(&self) {
        self.sessions.clear().await;
        self.history.clear().await;
    }

    pub fn sessions(&self) -> &SessionStatsAggregator {
        &self.sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::InMemorySampleStore;
    use sign_core::{DetectionQuality, ERROR_LABEL, POSE_NOT_DETECTED};
    use sign_model::{InMemoryArtifactStore, InferenceConfig};

    fn service() -> (LearningService, Arc<InMemorySampleStore>) {
        let inference = Arc::new(InferenceEngine::new(
            InferenceConfig::default(),
            Arc::new(InMemoryArtifactStore::new()),
        ));
        let samples = Arc::new(InMemorySampleStore::new());
        let service = LearningService::new(LearningConfig::default(), inference, samples.clone());
        (service, samples)
    }

    fn pose() -> Vec<Landmark> {
        (0..21)
            .map(|i| Landmark::new(0.5, 0.9 - i as f64 * 0.01, 0.0))
            .collect()
    }

    #[tokio::test]
    async fn test_wrong_landmark_count_yields_error_result() {
        let (service, _) = service();
        let result = service
            .compare_to_target(&ModelId::new("m"), &pose()[..20], "a")
            .await;

        assert_eq!(result.prediction, ERROR_LABEL);
        assert_eq!(result.confidence, 0.0);
        assert!(!result.is_match);
        assert_eq!(result.similarity, 0.0);
        assert_eq!(result.detection_quality, DetectionQuality::Error);
    }

    #[tokio::test]
    async fn test_missing_model_yields_error_result() {
        let (service, _) = service();
        let result = service
            .compare_to_target(&ModelId::new("ghost"), &pose(), "a")
            .await;
        assert!(result.is_error());
        assert!(result.feedback.contains("not found"));
    }

    #[tokio::test]
    async fn test_collapsed_pose_is_recorded_with_similarity() {
        let (service, samples) = service();
        let id = ModelId::new("m");
        let collapsed = vec![Landmark::new(0.5, 0.5, 0.0); 21];
        samples.add_landmarks(&id, "a", &collapsed);

        let key = SessionKey::new(id.clone(), Some("u1"));
        let result = service.compare_for_session(&key, &collapsed, "a").await;
        assert_eq!(result.prediction, POSE_NOT_DETECTED);
        assert!(!result.is_match);
        assert_eq!(result.similarity, 1.0);
        assert_eq!(result.detection_quality, DetectionQuality::Poor);
        assert_eq!(service.comparison_history(&key, "a").await.len(), 1);

        assert!(service.reset_progress(&key).await);
        assert!(service.comparison_history(&key, "a").await.is_empty());
    }

    #[tokio::test]
    async fn test_references_listing() {
        let (service, samples) = service();
        let id = ModelId::new("m");
        samples.add_landmarks(&id, "b", &pose());
        samples.add_landmarks(&id, "a", &pose());
        samples.add_landmarks(&id, "a", &pose());

        let refs = service.references(&id).await.unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].label, "a");
        assert_eq!(refs[0].total_samples, 2);
    }
}
