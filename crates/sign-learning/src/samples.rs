//! Read access to the historical sample store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use sign_core::{Landmark, ModelId, Result, StoredSample, TrainingSample};

#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Every sample of a model in insertion order.
    async fn samples_for_model(&self, model_id: &ModelId) -> Result<Vec<StoredSample>>;

    /// At most `limit` samples of one label in insertion order.
    async fn samples_for_label(
        &self,
        model_id: &ModelId,
        label: &str,
        limit: usize,
    ) -> Result<Vec<StoredSample>>;
}

/// Convert stored rows into trainer input.
///
/// Rows whose landmarks cannot be parsed become empty samples so the trainer
/// drops and counts them along with every other invalid sample.
pub fn training_samples(stored: &[StoredSample]) -> Vec<TrainingSample> {
    stored
        .iter()
        .map(|s| {
            let landmarks: Vec<Landmark> = s.parsed_landmarks().unwrap_or_default();
            TrainingSample {
                label: s.label.clone(),
                landmarks,
                image_data: s.image_data.clone(),
                created_at: s.created_at,
            }
        })
        .collect()
}

/// Process-local sample store
#[derive(Default)]
pub struct InMemorySampleStore {
    samples: RwLock<HashMap<ModelId, Vec<StoredSample>>>,
}

impl InMemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, model_id: &ModelId, sample: StoredSample) {
        self.samples
            .write()
            .entry(model_id.clone())
            .or_default()
            .push(sample);
    }

    pub fn add_landmarks(&self, model_id: &ModelId, label: &str, landmarks: &[Landmark]) {
        self.add(model_id, StoredSample::from_landmarks(label, landmarks));
    }

    pub fn remove_model(&self, model_id: &ModelId) -> usize {
        self.samples
            .write()
            .remove(model_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    pub fn count(&self, model_id: &ModelId) -> usize {
        self.samples.read().get(model_id).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl SampleStore for InMemorySampleStore {
    async fn samples_for_model(&self, model_id: &ModelId) -> Result<Vec<StoredSample>> {
        Ok(self.samples.read().get(model_id).cloned().unwrap_or_default())
    }

    async fn samples_for_label(
        &self,
        model_id: &ModelId,
        label: &str,
        limit: usize,
    ) -> Result<Vec<StoredSample>> {
        Ok(self
            .samples
            .read()
            .get(model_id)
            .map(|all| {
                all.iter()
                    .filter(|s| s.label == label)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
