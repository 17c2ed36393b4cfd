//! Background training job tracking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sign_core::{Error, ModelId, Result};
use sign_model::{EpochRecord, TrainingMetrics, TrainingObserver, TrainingPhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Preparing,
    Training,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled
        )
    }
}

/// Pollable state of one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingJob {
    pub job_id: Uuid,
    pub model_id: ModelId,
    pub status: JobStatus,
    /// Percent complete
    pub progress: f64,
    pub current_epoch: usize,
    pub total_epochs: usize,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metrics: Option<TrainingMetrics>,
    pub error: Option<String>,
}

impl TrainingJob {
    fn new(model_id: ModelId) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            model_id,
            status: JobStatus::Preparing,
            progress: 0.0,
            current_epoch: 0,
            total_epochs: 0,
            message: "Preparing training data".to_string(),
            started_at: Utc::now(),
            completed_at: None,
            metrics: None,
            error: None,
        }
    }
}

struct JobEntry {
    job: TrainingJob,
    cancel: Arc<AtomicBool>,
}

/// Latest training job per model
#[derive(Clone, Default)]
pub struct TrainingJobRegistry {
    jobs: Arc<RwLock<HashMap<ModelId, JobEntry>>>,
}

impl TrainingJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job. Fails while another job for the model is active.
    pub fn start(&self, model_id: &ModelId) -> Result<JobHandle> {
        let mut jobs = self.jobs.write();
        if let Some(existing) = jobs.get(model_id) {
            if !existing.job.status.is_terminal() {
                return Err(Error::InvalidInput(format!(
                    "Model {} is already training (job {})",
                    model_id, existing.job.job_id
                )));
            }
        }

        let job = TrainingJob::new(model_id.clone());
        let cancel = Arc::new(AtomicBool::new(false));
        let handle = JobHandle {
            registry: self.clone(),
            model_id: model_id.clone(),
            job_id: job.job_id,
            cancel: cancel.clone(),
        };
        tracing::info!("Training job {} started for {}", job.job_id, model_id);
        jobs.insert(model_id.clone(), JobEntry { job, cancel });
        Ok(handle)
    }

    pub fn progress(&self, model_id: &ModelId) -> Option<TrainingJob> {
        self.jobs.read().get(model_id).map(|e| e.job.clone())
    }

    /// Request cancellation of the active job. Returns whether one existed.
    pub fn cancel(&self, model_id: &ModelId) -> bool {
        let mut jobs = self.jobs.write();
        let Some(entry) = jobs.get_mut(model_id) else {
            return false;
        };
        if entry.job.status.is_terminal() {
            return false;
        }

        entry.cancel.store(true, Ordering::SeqCst);
        entry.job.status = JobStatus::Cancelled;
        entry.job.message = "Training cancelled".to_string();
        entry.job.completed_at = Some(Utc::now());
        tracing::info!("Training job {} for {} cancelled", entry.job.job_id, model_id);
        true
    }

    /// Cancel every active job. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<ModelId> = self.jobs.read().keys().cloned().collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    pub fn active_count(&self) -> usize {
        self.jobs
            .read()
            .values()
            .filter(|e| !e.job.status.is_terminal())
            .count()
    }

    pub fn remove(&self, model_id: &ModelId) {
        self.jobs.write().remove(model_id);
    }

    /// Mutate the job only while it is still the live, non-terminal job.
    fn update(&self, model_id: &ModelId, job_id: Uuid, f: impl FnOnce(&mut TrainingJob)) {
        let mut jobs = self.jobs.write();
        if let Some(entry) = jobs.get_mut(model_id) {
            if entry.job.job_id == job_id && !entry.job.status.is_terminal() {
                f(&mut entry.job);
            }
        }
    }
}

/// Link between a running training task and its registry entry.
///
/// Dropping a handle whose job never reached a terminal state marks the job
/// as failed, which covers panics in the training task.
pub struct JobHandle {
    registry: TrainingJobRegistry,
    model_id: ModelId,
    job_id: Uuid,
    cancel: Arc<AtomicBool>,
}

impl JobHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn snapshot(&self) -> Option<TrainingJob> {
        self.registry
            .progress(&self.model_id)
            .filter(|j| j.job_id == self.job_id)
    }

    pub fn complete(&self, metrics: TrainingMetrics) {
        self.registry.update(&self.model_id, self.job_id, |job| {
            job.status = JobStatus::Completed;
            job.progress = 100.0;
            job.message = "Training completed successfully".to_string();
            job.completed_at = Some(Utc::now());
            job.metrics = Some(metrics);
        });
        tracing::info!("Training job {} for {} completed", self.job_id, self.model_id);
    }

    pub fn fail(&self, error: &Error) {
        if matches!(error, Error::Cancelled(_)) {
            self.registry.update(&self.model_id, self.job_id, |job| {
                job.status = JobStatus::Cancelled;
                job.message = "Training cancelled".to_string();
                job.completed_at = Some(Utc::now());
            });
            return;
        }

        tracing::error!(
            "Training job {} for {} failed: {}",
            self.job_id,
            self.model_id,
            error
        );
        self.registry.update(&self.model_id, self.job_id, |job| {
            job.status = JobStatus::Error;
            job.message = format!("Training failed: {}", error);
            job.error = Some(error.to_string());
            job.completed_at = Some(Utc::now());
        });
    }
}

impl TrainingObserver for JobHandle {
    fn on_phase(&self, phase: TrainingPhase) {
        let (status, message) = match phase {
            TrainingPhase::Preparing => (JobStatus::Preparing, "Preparing training data"),
            TrainingPhase::Training => (JobStatus::Training, "Training model"),
            TrainingPhase::Persisting => (JobStatus::Training, "Saving model"),
        };
        self.registry.update(&self.model_id, self.job_id, |job| {
            job.status = status;
            job.message = message.to_string();
        });
    }

    fn on_epoch(&self, epoch: usize, total_epochs: usize, record: &EpochRecord) {
        self.registry.update(&self.model_id, self.job_id, |job| {
            job.current_epoch = epoch;
            job.total_epochs = total_epochs;
            // 100 is reserved for a persisted artifact
            job.progress = (epoch as f64 / total_epochs.max(1) as f64 * 100.0).min(99.0);
            job.message = format!(
                "Epoch {}/{} - loss {:.4}, accuracy {:.3}",
                epoch, total_epochs, record.loss, record.accuracy
            );
        });
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        let mut ended_abnormally = false;
        self.registry.update(&self.model_id, self.job_id, |job| {
            ended_abnormally = true;
            job.status = JobStatus::Error;
            job.message = "Training task ended unexpectedly".to_string();
            job.error = Some(job.message.clone());
            job.completed_at = Some(Utc::now());
        });
        if ended_abnormally {
            tracing::error!(
                "Training job {} for {} ended without a result",
                self.job_id,
                self.model_id
            );
        }
    }
}
