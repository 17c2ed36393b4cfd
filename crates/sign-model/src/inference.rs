//! Live gesture classification against cached trained artifacts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use candle_core::Device;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use sign_core::{
    Error, FeatureExtractor, Landmark, ModelId, PredictionResult, Result, LANDMARK_COUNT,
};

use crate::artifact::{ArtifactVersion, TrainedArtifact};
use crate::classifier::{DeviceType, GestureClassifier};
use crate::rejection::{pose_check, PoseCheck, RejectionPolicy};
use crate::report::TrainingMetrics;
use crate::scaler::StandardScaler;
use crate::store::ArtifactStore;
use crate::validator::GestureValidator;

/// Inference engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub rejection: RejectionPolicy,
    /// Treat poses that cannot be checked as plausible
    pub pose_check_fail_open: bool,
    /// Check the store version before serving a cached artifact
    pub verify_freshness: bool,
    pub device: DeviceType,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            rejection: RejectionPolicy::default(),
            pose_check_fail_open: true,
            verify_freshness: true,
            device: DeviceType::Cpu,
        }
    }
}

/// Artifact rebuilt into a ready-to-run classifier
pub struct LoadedModel {
    pub version: ArtifactVersion,
    pub classes: Vec<String>,
    pub scaler: StandardScaler,
    pub validator: GestureValidator,
    pub metrics: TrainingMetrics,
    classifier: GestureClassifier,
    device: Device,
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("version", &self.version)
            .field("classes", &self.classes)
            .field("input_dim", &self.classifier.input_dim())
            .finish_non_exhaustive()
    }
}

impl LoadedModel {
    pub fn from_artifact(artifact: &TrainedArtifact, device: Device) -> Result<Self> {
        let classifier = artifact
            .build_classifier(&device)
            .map_err(|e| Error::Inference(e.to_string()))?;
        Ok(Self {
            version: artifact.version,
            classes: artifact.classes.clone(),
            scaler: artifact.scaler.clone(),
            validator: artifact.validator.clone(),
            metrics: artifact.metrics.clone(),
            classifier,
            device,
        })
    }

    /// Raw class probabilities for already extracted features.
    pub fn probabilities(&self, features: &[f32]) -> Result<Vec<f32>> {
        let scaled = self.scaler.transform_or_raw(features);
        if !self.validator.validate(&scaled) {
            tracing::debug!("Features outside the validator envelope");
        }
        self.classifier
            .probabilities(&scaled, &self.device)
            .map_err(|e| Error::Inference(e.to_string()))
    }
}

/// Loaded models keyed by model id
#[derive(Default)]
pub struct ArtifactCache {
    entries: RwLock<HashMap<ModelId, Arc<LoadedModel>>>,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, model_id: &ModelId) -> Option<Arc<LoadedModel>> {
        self.entries.read().get(model_id).cloned()
    }

    /// Insert unless a newer version is already cached. Returns the entry
    /// that ends up cached.
    pub fn insert_if_newer(&self, model_id: &ModelId, model: Arc<LoadedModel>) -> Arc<LoadedModel> {
        let mut entries = self.entries.write();
        match entries.get(model_id) {
            Some(existing) if !model.version.is_newer_than(&existing.version) => existing.clone(),
            _ => {
                entries.insert(model_id.clone(), model.clone());
                model
            }
        }
    }

    pub fn evict(&self, model_id: &ModelId) -> bool {
        self.entries.write().remove(model_id).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

pub struct InferenceEngine {
    config: InferenceConfig,
    store: Arc<dyn ArtifactStore>,
    cache: ArtifactCache,
    extractor: FeatureExtractor,
}

impl InferenceEngine {
    pub fn new(config: InferenceConfig, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            config,
            store,
            cache: ArtifactCache::new(),
            extractor: FeatureExtractor::new(),
        }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Classify one live hand pose.
    ///
    /// Malformed input fails with [`Error::InvalidInput`]; every other
    /// failure is wrapped in [`Error::Prediction`] naming the model.
    pub async fn predict(
        &self,
        model_id: &ModelId,
        landmarks: &[Landmark],
    ) -> Result<PredictionResult> {
        if landmarks.len() != LANDMARK_COUNT {
            return Err(Error::InvalidInput(format!(
                "Expected {} landmarks, got {}",
                LANDMARK_COUNT,
                landmarks.len()
            )));
        }

        match pose_check(landmarks) {
            PoseCheck::Plausible => {}
            PoseCheck::Implausible => return Ok(PredictionResult::pose_not_detected()),
            PoseCheck::Indeterminate if self.config.pose_check_fail_open => {
                tracing::debug!("Pose check indeterminate for {}, continuing", model_id);
            }
            PoseCheck::Indeterminate => return Ok(PredictionResult::pose_not_detected()),
        }

        self.classify(model_id, landmarks)
            .await
            .map_err(|e| Error::prediction(model_id.as_str(), e))
    }

    async fn classify(
        &self,
        model_id: &ModelId,
        landmarks: &[Landmark],
    ) -> Result<PredictionResult> {
        let model = self.model(model_id).await?;
        let features = self.extractor.extract(landmarks)?;
        let probs = model.probabilities(features.as_slice())?;
        let result = self.config.rejection.apply(&probs, &model.classes)?;

        tracing::debug!(
            "Model {} predicted {} ({:.3})",
            model_id,
            result.prediction,
            result.confidence
        );
        Ok(result)
    }

    /// Cached model, reloaded when the store holds a newer version.
    pub async fn model(&self, model_id: &ModelId) -> Result<Arc<LoadedModel>> {
        let cached = self.cache.get(model_id);
        if let Some(model) = &cached {
            if !self.config.verify_freshness {
                return Ok(model.clone());
            }
        }

        let current = self.store.version(model_id).await?;
        match (cached, current) {
            (Some(model), Some(version))
                if model.version == version || model.version.is_newer_than(&version) =>
            {
                return Ok(model);
            }
            (Some(_), None) => {
                tracing::info!("Artifact for {} disappeared, evicting", model_id);
                self.cache.evict(model_id);
                return Err(Error::ModelNotFound(model_id.to_string()));
            }
            (None, None) => return Err(Error::ModelNotFound(model_id.to_string())),
            _ => {}
        }

        let artifact = self.store.load(model_id).await?;
        tracing::info!(
            "Loaded artifact {} version {}",
            model_id,
            artifact.version.id
        );
        self.install(&artifact)
    }

    /// Put a freshly trained artifact into the cache.
    pub fn install(&self, artifact: &TrainedArtifact) -> Result<Arc<LoadedModel>> {
        let device = self
            .config
            .device
            .device()
            .map_err(|e| Error::Inference(e.to_string()))?;
        let loaded = Arc::new(LoadedModel::from_artifact(artifact, device)?);
        Ok(self.cache.insert_if_newer(&artifact.model_id, loaded))
    }

    pub fn evict(&self, model_id: &ModelId) -> bool {
        self.cache.evict(model_id)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::tests::sample_artifact;
    use crate::store::InMemoryArtifactStore;
    use sign_core::PredictionOutcome;

    fn hand() -> Vec<Landmark> {
        (0..21)
            .map(|i| Landmark::new(0.5 + (i % 4) as f64 * 0.01, 0.9 - i as f64 * 0.02, 0.0))
            .collect()
    }

    fn engine(store: Arc<InMemoryArtifactStore>) -> InferenceEngine {
        InferenceEngine::new(InferenceConfig::default(), store)
    }

    #[tokio::test]
    async fn test_missing_model_is_not_found_prediction_error() {
        let engine = engine(Arc::new(InMemoryArtifactStore::new()));
        let err = engine.predict(&ModelId::new("ghost"), &hand()).await.unwrap_err();

        assert!(matches!(err, Error::Prediction { .. }));
        assert!(err.is_not_found());
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_wrong_landmark_count_is_invalid_input() {
        let engine = engine(Arc::new(InMemoryArtifactStore::new()));
        let err = engine
            .predict(&ModelId::new("m"), &hand()[..20])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_collapsed_pose_short_circuits() {
        let engine = engine(Arc::new(InMemoryArtifactStore::new()));
        let collapsed = vec![Landmark::new(0.5, 0.5, 0.0); 21];
        let result = engine.predict(&ModelId::new("ghost"), &collapsed).await.unwrap();
        assert_eq!(result.outcome, PredictionOutcome::PoseNotDetected);
        assert_eq!(result.confidence, 0.0);
        assert!(result.probabilities.is_empty());
    }

    #[tokio::test]
    async fn test_prediction_shape_from_stored_artifact() {
        let store = Arc::new(InMemoryArtifactStore::new());
        store.save(&sample_artifact("m")).await.unwrap();
        let engine = engine(store);

        let result = engine.predict(&ModelId::new("m"), &hand()).await.unwrap();
        assert!((0.0..=1.0).contains(&result.confidence));
        assert_eq!(result.probabilities.len(), 2);
        assert_eq!(engine.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_newer_store_version_replaces_cache() {
        let store = Arc::new(InMemoryArtifactStore::new());
        let engine = engine(store.clone());
        let id = ModelId::new("m");

        let first = sample_artifact("m");
        store.save(&first).await.unwrap();
        let loaded = engine.model(&id).await.unwrap();
        assert_eq!(loaded.version, first.version);
        assert!(format!("{:?}", loaded).starts_with("LoadedModel"));

        let mut second = sample_artifact("m");
        second.version.created_at = first.version.created_at + chrono::Duration::seconds(5);
        store.save(&second).await.unwrap();
        assert_eq!(engine.model(&id).await.unwrap().version, second.version);

        store.delete(&id).await.unwrap();
        assert!(engine.model(&id).await.unwrap_err().is_not_found());
        assert!(engine.cache().is_empty());
    }

    #[tokio::test]
    async fn test_insert_if_newer_keeps_newest() {
        let engine = engine(Arc::new(InMemoryArtifactStore::new()));
        let newer = sample_artifact("m");
        let mut older = sample_artifact("m");
        older.version.created_at = newer.version.created_at - chrono::Duration::seconds(5);

        engine.install(&newer).unwrap();
        let kept = engine.install(&older).unwrap();
        assert_eq!(kept.version, newer.version);
    }
}
