//! Engine facade wiring training, inference and the practice loop.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use sign_core::{ComparisonResult, Landmark, ModelId, PredictionResult, Result};
use sign_learning::{
    training_samples, LabelPerformance, LearningService, ProgressUpdate, ReferenceSample,
    SampleStore, SessionKey, SessionStats,
};
use sign_model::{
    ArtifactStore, ClassifierTrainer, FsArtifactStore, InferenceEngine, TrainingMetrics,
};

use crate::config::EngineConfig;
use crate::jobs::{JobHandle, TrainingJob, TrainingJobRegistry};
use crate::validation::{validate_samples, ValidationReport};

/// Everything a training run needs, cheap to move into a background task
#[derive(Clone)]
struct TrainingPipeline {
    trainer: ClassifierTrainer,
    artifacts: Arc<dyn ArtifactStore>,
    samples: Arc<dyn SampleStore>,
    inference: Arc<InferenceEngine>,
}

impl TrainingPipeline {
    async fn run(&self, model_id: ModelId, handle: Arc<JobHandle>) -> Result<TrainingMetrics> {
        let result = self.train(model_id.clone(), handle.clone()).await;
        match &result {
            Ok(metrics) => handle.complete(metrics.clone()),
            Err(e) => handle.fail(e),
        }
        result
    }

    async fn train(&self, model_id: ModelId, handle: Arc<JobHandle>) -> Result<TrainingMetrics> {
        let stored = self.samples.samples_for_model(&model_id).await?;
        tracing::info!(
            "Training model {} on {} stored samples",
            model_id,
            stored.len()
        );

        let artifact = self
            .trainer
            .train(
                model_id,
                training_samples(&stored),
                self.artifacts.as_ref(),
                handle,
            )
            .await?;

        // The artifact is already persisted; a cache miss here only costs a reload.
        if let Err(e) = self.inference.install(&artifact) {
            tracing::warn!("Could not cache model {}: {}", artifact.model_id, e);
        }
        Ok(artifact.metrics)
    }
}

/// Public entry point of the gesture engine
pub struct SignEngine {
    config: EngineConfig,
    pipeline: TrainingPipeline,
    learning: LearningService,
    jobs: TrainingJobRegistry,
    tasks: Mutex<HashMap<ModelId, JoinHandle<()>>>,
}

impl SignEngine {
    pub fn new(
        config: EngineConfig,
        artifacts: Arc<dyn ArtifactStore>,
        samples: Arc<dyn SampleStore>,
    ) -> Self {
        let inference = Arc::new(InferenceEngine::new(
            config.inference.clone(),
            artifacts.clone(),
        ));
        let learning = LearningService::new(
            config.learning.clone(),
            inference.clone(),
            samples.clone(),
        );
        let pipeline = TrainingPipeline {
            trainer: ClassifierTrainer::new(config.training.clone()),
            artifacts,
            samples,
            inference,
        };

        Self {
            config,
            pipeline,
            learning,
            jobs: TrainingJobRegistry::new(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Engine persisting artifacts under `config.storage.artifact_dir`.
    pub fn with_fs_store(config: EngineConfig, samples: Arc<dyn SampleStore>) -> Self {
        let artifacts = Arc::new(FsArtifactStore::new(config.storage.artifact_dir.clone()));
        tracing::info!(
            "Artifact store at {}",
            config.storage.artifact_dir.display()
        );
        Self::new(config, artifacts, samples)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn inference(&self) -> &InferenceEngine {
        &self.pipeline.inference
    }

    pub fn jobs(&self) -> &TrainingJobRegistry {
        &self.jobs
    }

    // ==================== Training ====================

    /// Check the stored samples of a model before training.
    pub async fn validate_samples(&self, model_id: &ModelId) -> Result<ValidationReport> {
        let stored = self.pipeline.samples.samples_for_model(model_id).await?;
        Ok(validate_samples(
            &stored,
            self.config.validation.min_samples_per_label,
        ))
    }

    /// Train and wait for the result. The run is tracked like a background job.
    pub async fn train(&self, model_id: &ModelId) -> Result<TrainingMetrics> {
        let handle = Arc::new(self.jobs.start(model_id)?);
        self.pipeline.run(model_id.clone(), handle).await
    }

    /// Train in the background; poll with [`training_progress`](Self::training_progress).
    pub fn start_training(&self, model_id: &ModelId) -> Result<TrainingJob> {
        let handle = Arc::new(self.jobs.start(model_id)?);
        let job = handle
            .snapshot()
            .ok_or_else(|| sign_core::Error::Training("Job vanished on start".to_string()))?;

        let pipeline = self.pipeline.clone();
        let task_id = model_id.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = pipeline.run(task_id.clone(), handle).await {
                tracing::debug!("Background training for {} ended: {}", task_id, e);
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|_, t| !t.is_finished());
        tasks.insert(model_id.clone(), task);
        Ok(job)
    }

    pub fn training_progress(&self, model_id: &ModelId) -> Option<TrainingJob> {
        self.jobs.progress(model_id)
    }

    pub fn cancel_training(&self, model_id: &ModelId) -> bool {
        self.jobs.cancel(model_id)
    }

    /// Metrics of the live artifact, zeroed when the model was never trained.
    pub async fn model_metrics(&self, model_id: &ModelId) -> Result<TrainingMetrics> {
        match self.pipeline.inference.model(model_id).await {
            Ok(model) => Ok(model.metrics.clone()),
            Err(e) if e.is_not_found() => Ok(TrainingMetrics::default()),
            Err(e) => Err(e),
        }
    }

    /// Cancel training, delete every artifact version and forget practice
    /// state. Returns whether an artifact existed.
    pub async fn delete_model(&self, model_id: &ModelId) -> Result<bool> {
        self.jobs.cancel(model_id);
        let task = self.tasks.lock().remove(model_id);
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("Training task for {} failed: {}", model_id, e);
            }
        }

        let existed = self.pipeline.artifacts.delete(model_id).await?;
        self.pipeline.inference.evict(model_id);
        self.learning.forget_model(model_id).await;
        self.jobs.remove(model_id);
        tracing::info!("Deleted model {} (artifact existed: {})", model_id, existed);
        Ok(existed)
    }

    // ==================== Inference ====================

    pub async fn predict(
        &self,
        model_id: &ModelId,
        landmarks: &[Landmark],
    ) -> Result<PredictionResult> {
        self.pipeline.inference.predict(model_id, landmarks).await
    }

    // ==================== Practice ====================

    pub async fn references(&self, model_id: &ModelId) -> Result<Vec<ReferenceSample>> {
        self.learning.references(model_id).await
    }

    /// Score an attempt at `target`. Failures come back as an error result.
    pub async fn compare_to_target(
        &self,
        model_id: &ModelId,
        session: Option<&str>,
        landmarks: &[Landmark],
        target: &str,
    ) -> ComparisonResult {
        let key = SessionKey::new(model_id.clone(), session);
        self.learning.compare_for_session(&key, landmarks, target).await
    }

    pub async fn update_progress(
        &self,
        model_id: &ModelId,
        session: Option<&str>,
        update: &ProgressUpdate,
    ) -> SessionStats {
        let key = SessionKey::new(model_id.clone(), session);
        self.learning.update_progress(&key, update).await
    }

    pub async fn session_stats(&self, model_id: &ModelId, session: Option<&str>) -> SessionStats {
        let key = SessionKey::new(model_id.clone(), session);
        self.learning.session_stats(&key).await
    }

    pub async fn label_performance(
        &self,
        model_id: &ModelId,
        session: Option<&str>,
        label: &str,
    ) -> LabelPerformance {
        let key = SessionKey::new(model_id.clone(), session);
        self.learning.label_performance(&key, label).await
    }

    pub async fn comparison_history(
        &self,
        model_id: &ModelId,
        session: Option<&str>,
        label: &str,
    ) -> Vec<ComparisonResult> {
        let key = SessionKey::new(model_id.clone(), session);
        self.learning.comparison_history(&key, label).await
    }

    /// Delete statistics and comparison history of one session.
    pub async fn reset_progress(&self, model_id: &ModelId, session: Option<&str>) -> bool {
        let key = SessionKey::new(model_id.clone(), session);
        self.learning.reset_progress(&key).await
    }

    // ==================== Lifecycle ====================

    /// Cancel running jobs, wait for their tasks and drop all cached state.
    pub async fn shutdown(&self) {
        let cancelled = self.jobs.cancel_all();
        let tasks: Vec<(ModelId, JoinHandle<()>)> = self.tasks.lock().drain().collect();
        for (model_id, task) in tasks {
            if let Err(e) = task.await {
                tracing::warn!("Training task for {} failed: {}", model_id, e);
            }
        }

        self.pipeline.inference.clear_cache();
        self.learning.clear().await;
        tracing::info!("Engine shut down ({} training jobs cancelled)", cancelled);
    }
}
