//! Feed-forward gesture classifier.
//!
//! A stack of ReLU dense layers with dropout, ending in a linear layer over
//! all classes (real labels plus the rejection sentinel). Softmax is applied
//! by the caller so training can use a fused log-softmax loss.

use candle_core::{Device, Module, Result, Tensor, D};
use candle_nn::{linear, ops::softmax, Dropout, Linear, VarBuilder};
use serde::{Deserialize, Serialize};

/// Named architecture variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierVariant {
    /// 512-256-128-64 hidden units
    Standard,
    /// 128-64 hidden units, for tiny datasets and tests
    Compact,
}

impl ClassifierVariant {
    /// (width, dropout probability) per hidden layer
    pub fn hidden_layers(&self) -> &'static [(usize, f32)] {
        match self {
            ClassifierVariant::Standard => &[(512, 0.4), (256, 0.3), (128, 0.2), (64, 0.1)],
            ClassifierVariant::Compact => &[(128, 0.2), (64, 0.1)],
        }
    }
}

/// Classifier hyper-parameters stored alongside trained weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub variant: ClassifierVariant,
    /// Initial Adam learning rate
    pub learning_rate: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            variant: ClassifierVariant::Standard,
            learning_rate: 0.0005,
        }
    }
}

/// Compute device for training and inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    #[default]
    Cpu,
    Cuda(usize),
    Metal,
}

impl DeviceType {
    pub fn device(&self) -> Result<Device> {
        match self {
            DeviceType::Cpu => Ok(Device::Cpu),
            DeviceType::Cuda(ordinal) => Device::new_cuda(*ordinal),
            DeviceType::Metal => Device::new_metal(0),
        }
    }
}

pub struct GestureClassifier {
    hidden: Vec<Linear>,
    dropout: Vec<Dropout>,
    output: Linear,
    input_dim: usize,
    n_classes: usize,
}

impl GestureClassifier {
    pub fn new(
        config: &ClassifierConfig,
        input_dim: usize,
        n_classes: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let mut hidden = Vec::new();
        let mut dropout = Vec::new();
        let mut width = input_dim;

        for (i, &(units, p)) in config.variant.hidden_layers().iter().enumerate() {
            hidden.push(linear(width, units, vb.pp(format!("hidden_{}", i)))?);
            dropout.push(Dropout::new(p));
            width = units;
        }

        let output = linear(width, n_classes, vb.pp("output"))?;

        Ok(Self {
            hidden,
            dropout,
            output,
            input_dim,
            n_classes,
        })
    }

    /// Logits `[batch, n_classes]` for inputs `[batch, input_dim]`.
    pub fn forward(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let mut x = xs.clone();
        for (layer, dropout) in self.hidden.iter().zip(&self.dropout) {
            x = layer.forward(&x)?.relu()?;
            x = dropout.forward(&x, train)?;
        }
        self.output.forward(&x)
    }

    /// Class probabilities for a single feature row.
    pub fn probabilities(&self, features: &[f32], device: &Device) -> Result<Vec<f32>> {
        let xs = Tensor::from_slice(features, (1, features.len()), device)?;
        let logits = self.forward(&xs, false)?;
        softmax(&logits, D::Minus1)?.squeeze(0)?.to_vec1::<f32>()
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    #[test]
    fn test_classifier_output_shape() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let config = ClassifierConfig {
            variant: ClassifierVariant::Compact,
            ..Default::default()
        };
        let model = GestureClassifier::new(&config, 78, 3, vb)?;

        let xs = Tensor::randn(0f32, 1.0, (4, 78), &device)?;
        let logits = model.forward(&xs, false)?;
        assert_eq!(logits.dims(), &[4, 3]);

        let probs = model.probabilities(&vec![0.5; 78], &device)?;
        assert_eq!(probs.len(), 3);
        let total: f32 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);

        Ok(())
    }

    #[test]
    fn test_standard_variant_registers_all_layers() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let _model = GestureClassifier::new(&ClassifierConfig::default(), 78, 4, vb)?;
        // weight + bias for 4 hidden layers and the output layer
        assert_eq!(varmap.all_vars().len(), 10);
        Ok(())
    }
}
