//! Trained model bundle: classifier weights plus everything needed to
//! reproduce preprocessing and label decoding at inference time.

use std::collections::HashMap;

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sign_core::{Error, ModelId, Result};

use crate::classifier::{ClassifierConfig, GestureClassifier};
use crate::dataset::LabelVocabulary;
use crate::report::TrainingMetrics;
use crate::scaler::StandardScaler;
use crate::validator::GestureValidator;

/// Identity of one training run's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactVersion {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl ArtifactVersion {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    pub fn is_newer_than(&self, other: &ArtifactVersion) -> bool {
        (self.created_at, self.id) > (other.created_at, other.id)
    }
}

impl Default for ArtifactVersion {
    fn default() -> Self {
        Self::new()
    }
}

/// Flattened tensor with its name and shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorData {
    pub fn from_tensor(name: impl Into<String>, tensor: &Tensor) -> candle_core::Result<Self> {
        Ok(Self {
            name: name.into(),
            shape: tensor.dims().to_vec(),
            data: tensor.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?,
        })
    }

    pub fn to_tensor(&self, device: &Device) -> candle_core::Result<Tensor> {
        Tensor::from_slice(&self.data, self.shape.as_slice(), device)
    }
}

/// Copy every variable of a var map into serializable form.
pub fn export_varmap(varmap: &VarMap) -> candle_core::Result<Vec<TensorData>> {
    let data = varmap
        .data()
        .lock()
        .map_err(|e| candle_core::Error::Msg(format!("Variable map lock poisoned: {}", e)))?;

    let mut tensors = data
        .iter()
        .map(|(name, var)| TensorData::from_tensor(name.clone(), var.as_tensor()))
        .collect::<candle_core::Result<Vec<_>>>()?;
    tensors.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(tensors)
}

/// Everything produced by one training run. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedArtifact {
    pub model_id: ModelId,
    pub version: ArtifactVersion,
    /// Real labels in sorted order, sentinel last
    pub classes: Vec<String>,
    pub input_dim: usize,
    pub classifier: ClassifierConfig,
    pub scaler: StandardScaler,
    pub validator: GestureValidator,
    pub tensors: Vec<TensorData>,
    pub metrics: TrainingMetrics,
}

impl TrainedArtifact {
    pub fn vocabulary(&self) -> LabelVocabulary {
        LabelVocabulary::from_classes(self.classes.clone())
    }

    /// Rebuild the classifier with the stored weights.
    pub fn build_classifier(&self, device: &Device) -> candle_core::Result<GestureClassifier> {
        let mut weights = HashMap::with_capacity(self.tensors.len());
        for t in &self.tensors {
            weights.insert(t.name.clone(), t.to_tensor(device)?);
        }
        let vb = VarBuilder::from_tensors(weights, DType::F32, device);
        GestureClassifier::new(&self.classifier, self.input_dim, self.classes.len(), vb)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let artifact: TrainedArtifact = serde_json::from_slice(bytes)?;
        if artifact.classes.is_empty() {
            return Err(Error::Serialization(format!(
                "Artifact for {} has no classes",
                artifact.model_id
            )));
        }
        Ok(artifact)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::classifier::ClassifierVariant;
    use sign_core::SENTINEL_LABEL;

    /// Small untrained artifact for store and cache tests.
    pub(crate) fn sample_artifact(model_id: &str) -> TrainedArtifact {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let classifier = ClassifierConfig {
            variant: ClassifierVariant::Compact,
            ..Default::default()
        };
        let classes = vec!["a".to_string(), "b".to_string(), SENTINEL_LABEL.to_string()];
        GestureClassifier::new(&classifier, 78, classes.len(), vb).unwrap();

        TrainedArtifact {
            model_id: ModelId::new(model_id),
            version: ArtifactVersion::new(),
            classes,
            input_dim: 78,
            classifier,
            scaler: StandardScaler::identity(78),
            validator: GestureValidator::default(),
            tensors: export_varmap(&varmap).unwrap(),
            metrics: TrainingMetrics::default(),
        }
    }

    #[test]
    fn test_bytes_round_trip_rebuilds_same_outputs() -> candle_core::Result<()> {
        let artifact = sample_artifact("m1");
        let restored = TrainedArtifact::from_bytes(&artifact.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.version, artifact.version);

        let device = Device::Cpu;
        let input = vec![0.25f32; 78];
        let a = artifact.build_classifier(&device)?.probabilities(&input, &device)?;
        let b = restored.build_classifier(&device)?.probabilities(&input, &device)?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_export_covers_every_layer() {
        let artifact = sample_artifact("m1");
        let names: Vec<&str> = artifact.tensors.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"hidden_0.weight"));
        assert!(names.contains(&"output.bias"));
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn test_version_ordering() {
        let older = ArtifactVersion::new();
        let newer = ArtifactVersion {
            id: Uuid::new_v4(),
            created_at: older.created_at + chrono::Duration::seconds(1),
        };
        assert!(newer.is_newer_than(&older));
        assert!(!older.is_newer_than(&newer));
        assert!(!older.is_newer_than(&older));
    }
}
