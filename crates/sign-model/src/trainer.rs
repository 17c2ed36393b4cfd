//! Classifier training pipeline.
//!
//! Samples are validated and featurized, synthetic negatives are added
//! under the sentinel label, features are standardized, and a
//! [`GestureClassifier`] is fitted with class-weighted cross-entropy,
//! early stopping and learning-rate decay on plateau.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{ops::log_softmax, AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use sign_core::{
    augment, filter_outliers, AugmentationConfig, Error, FeatureExtractor, HandLandmarks, ModelId,
    Result, TrainingSample,
};

use crate::artifact::{export_varmap, ArtifactVersion, TrainedArtifact};
use crate::classifier::{ClassifierConfig, DeviceType, GestureClassifier};
use crate::dataset::{
    batch_size, check_sufficient, class_weights, epoch_budget, prepare_positives,
    stratified_split, LabelVocabulary, PositiveSet, Split,
};
use crate::negatives::{NegativeSampleConfig, NegativeSampleSynthesizer};
use crate::report::{
    accuracy, class_distribution, classification_report, EpochRecord, TrainingMetrics,
};
use crate::scaler::StandardScaler;
use crate::store::ArtifactStore;
use crate::validator::GestureValidator;

/// Training hyper-parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub classifier: ClassifierConfig,
    /// Seed for splitting, shuffling and negative synthesis
    pub seed: u64,
    /// Fraction of every class held out for evaluation
    pub test_fraction: f64,
    /// A held-out set is only used above this many rows
    pub min_split_samples: usize,
    /// Epochs without improvement before stopping
    pub early_stopping_patience: usize,
    /// Epochs without improvement before decaying the learning rate
    pub lr_patience: usize,
    pub lr_factor: f64,
    pub min_lr: f64,
    pub negatives: NegativeSampleConfig,
    /// Per-label outlier filter threshold in standard deviations
    pub outlier_threshold: Option<f64>,
    /// Augmented copies added per valid sample
    pub augment_copies: usize,
    pub augmentation: AugmentationConfig,
    pub device: DeviceType,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            seed: 42,
            test_fraction: 0.2,
            min_split_samples: 10,
            early_stopping_patience: 20,
            lr_patience: 10,
            lr_factor: 0.2,
            min_lr: 1e-5,
            negatives: NegativeSampleConfig::default(),
            outlier_threshold: None,
            augment_copies: 0,
            augmentation: AugmentationConfig::default(),
            device: DeviceType::Cpu,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    Preparing,
    Training,
    Persisting,
}

/// Hooks for progress reporting and cooperative cancellation.
pub trait TrainingObserver: Send + Sync {
    fn on_phase(&self, _phase: TrainingPhase) {}

    fn on_epoch(&self, _epoch: usize, _total_epochs: usize, _record: &EpochRecord) {}

    /// Polled once per epoch and before persisting.
    fn is_cancelled(&self) -> bool {
        false
    }
}

pub struct NoopObserver;

impl TrainingObserver for NoopObserver {}

fn training_error(e: candle_core::Error) -> Error {
    Error::Training(e.to_string())
}

/// Feature matrix and targets on the training device
struct Tensors {
    xs: Tensor,
    ys: Tensor,
    targets: Vec<u32>,
}

impl Tensors {
    fn new(rows: &[Vec<f32>], targets: Vec<u32>, device: &Device) -> candle_core::Result<Self> {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Ok(Self {
            xs: Tensor::from_vec(flat, (rows.len(), dim), device)?,
            ys: Tensor::from_slice(&targets, targets.len(), device)?,
            targets,
        })
    }

    fn select(&self, indices: &[usize], device: &Device) -> candle_core::Result<Self> {
        let idx: Vec<u32> = indices.iter().map(|&i| i as u32).collect();
        let idx = Tensor::from_vec(idx, indices.len(), device)?;
        Ok(Self {
            xs: self.xs.index_select(&idx, 0)?,
            ys: self.ys.index_select(&idx, 0)?,
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
        })
    }

    fn len(&self) -> usize {
        self.targets.len()
    }
}

/// Mean of `-w[y] * log p(y)` over the batch.
pub fn weighted_cross_entropy(
    logits: &Tensor,
    targets: &Tensor,
    weights: &Tensor,
) -> candle_core::Result<Tensor> {
    let log_probs = log_softmax(logits, D::Minus1)?;
    let picked = log_probs.gather(&targets.unsqueeze(1)?, 1)?.squeeze(1)?;
    let w = weights.index_select(targets, 0)?;
    (picked * w)?.neg()?.mean_all()
}

/// Unweighted loss and accuracy in evaluation mode.
fn evaluate(
    model: &GestureClassifier,
    data: &Tensors,
) -> candle_core::Result<(f64, f64, Vec<u32>)> {
    let logits = model.forward(&data.xs, false)?;
    let loss = candle_nn::loss::cross_entropy(&logits, &data.ys)?.to_scalar::<f32>()?;
    let predicted = logits.argmax(D::Minus1)?.to_vec1::<u32>()?;
    Ok((loss as f64, accuracy(&data.targets, &predicted), predicted))
}

/// Deep copy of every variable, for restoring the best epoch.
fn snapshot(varmap: &VarMap) -> candle_core::Result<HashMap<String, Tensor>> {
    let data = varmap
        .data()
        .lock()
        .map_err(|e| candle_core::Error::Msg(format!("Variable map lock poisoned: {}", e)))?;
    data.iter()
        .map(|(name, var)| Ok((name.clone(), var.as_tensor().copy()?)))
        .collect()
}

fn restore(varmap: &VarMap, weights: &HashMap<String, Tensor>) -> candle_core::Result<()> {
    let data = varmap
        .data()
        .lock()
        .map_err(|e| candle_core::Error::Msg(format!("Variable map lock poisoned: {}", e)))?;
    for (name, var) in data.iter() {
        if let Some(tensor) = weights.get(name) {
            var.set(tensor)?;
        }
    }
    Ok(())
}

/// Outcome of the optimization loop
struct FitOutcome {
    history: Vec<EpochRecord>,
    stopped_early: bool,
}

#[derive(Clone, Default)]
pub struct ClassifierTrainer {
    config: TrainingConfig,
    extractor: FeatureExtractor,
}

impl ClassifierTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            extractor: FeatureExtractor::new(),
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train on a background thread and persist the artifact.
    ///
    /// Nothing is written when training fails or is cancelled.
    pub async fn train(
        &self,
        model_id: ModelId,
        samples: Vec<TrainingSample>,
        store: &dyn ArtifactStore,
        observer: Arc<dyn TrainingObserver>,
    ) -> Result<TrainedArtifact> {
        let trainer = self.clone();
        let worker_observer = observer.clone();
        let worker_id = model_id.clone();

        let artifact = tokio::task::spawn_blocking(move || {
            trainer.fit(&worker_id, &samples, worker_observer.as_ref())
        })
        .await
        .map_err(|e| Error::Training(format!("Training worker failed: {}", e)))??;

        if observer.is_cancelled() {
            return Err(Error::Cancelled(model_id.to_string()));
        }

        observer.on_phase(TrainingPhase::Persisting);
        store.save(&artifact).await?;
        Ok(artifact)
    }

    /// Run the full pipeline synchronously and return the unsaved artifact.
    pub fn fit(
        &self,
        model_id: &ModelId,
        samples: &[TrainingSample],
        observer: &dyn TrainingObserver,
    ) -> Result<TrainedArtifact> {
        let started = Instant::now();
        let config = &self.config;
        let mut rng = StdRng::seed_from_u64(config.seed);

        observer.on_phase(TrainingPhase::Preparing);

        let mut positives = prepare_positives(samples, &self.extractor);
        if positives.dropped > 0 {
            tracing::warn!(
                "Dropped {} invalid samples for model {}",
                positives.dropped,
                model_id
            );
        }
        check_sufficient(&positives)?;

        if let Some(threshold) = config.outlier_threshold {
            positives = self.filter_outliers_per_label(positives, threshold);
        }
        if config.augment_copies > 0 {
            self.add_augmented(&mut positives, &mut rng);
        }

        let n_positive = positives.len();
        let vocab = LabelVocabulary::from_labels(positives.labels.iter().map(String::as_str));

        let synthesizer = NegativeSampleSynthesizer::new(config.negatives.clone());
        let negatives = synthesizer
            .generate(
                &positives.features,
                NegativeSampleSynthesizer::default_count(n_positive),
                &mut rng,
            )
            .map_err(training_error)?;

        let mut targets = Vec::with_capacity(n_positive + negatives.len());
        for label in &positives.labels {
            let index = vocab
                .index_of(label)
                .ok_or_else(|| Error::Training(format!("Unknown label {}", label)))?;
            targets.push(index);
        }
        targets.extend(std::iter::repeat(vocab.sentinel_index() as u32).take(negatives.len()));

        let mut rows = positives.features;
        rows.extend(negatives);

        let scaler = StandardScaler::fit(&rows).ok_or(Error::InsufficientData {
            required: 1,
            available: 0,
        })?;
        let scaled = scaler.transform_all(&rows);
        let validator = GestureValidator::build(&scaled[..n_positive], &positives.labels);

        let split = if vocab.len() >= 2 && scaled.len() > config.min_split_samples {
            stratified_split(&targets, config.test_fraction, &mut rng)
        } else {
            Split::all(scaled.len())
        };

        tracing::info!(
            "Training model {}: {} positives, {} negatives, {} classes, {} train / {} held out",
            model_id,
            n_positive,
            scaled.len() - n_positive,
            vocab.len(),
            split.train.len(),
            split.test.len()
        );

        let device = config.device.device().map_err(training_error)?;
        let input_dim = scaled.first().map(|r| r.len()).unwrap_or(0);
        let all = Tensors::new(&scaled, targets, &device).map_err(training_error)?;
        let train = all.select(&split.train, &device).map_err(training_error)?;
        let test = if split.has_holdout() {
            Some(all.select(&split.test, &device).map_err(training_error)?)
        } else {
            None
        };

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = GestureClassifier::new(&config.classifier, input_dim, vocab.len(), vb)
            .map_err(training_error)?;

        observer.on_phase(TrainingPhase::Training);
        let outcome = self.optimize(
            model_id,
            &model,
            &varmap,
            &train,
            test.as_ref(),
            epoch_budget(n_positive),
            &device,
            &mut rng,
            observer,
        )?;

        let eval_set = test.as_ref().unwrap_or(&train);
        let (final_accuracy, confusion_matrix) = match &test {
            Some(test) => {
                let (_, acc, predicted) = evaluate(&model, test).map_err(training_error)?;
                (acc, classification_report(&test.targets, &predicted, &vocab))
            }
            // no held-out rows: report the last epoch's training accuracy
            None => (
                outcome.history.last().map(|r| r.accuracy).unwrap_or(0.0),
                BTreeMap::new(),
            ),
        };

        if observer.is_cancelled() {
            return Err(Error::Cancelled(model_id.to_string()));
        }

        let metrics = TrainingMetrics {
            accuracy: final_accuracy,
            total_samples: all.len(),
            evaluated_samples: eval_set.len(),
            training_time: started.elapsed().as_secs_f64(),
            epochs_run: outcome.history.len(),
            stopped_early: outcome.stopped_early,
            training_history: outcome.history,
            confusion_matrix,
            class_distribution: class_distribution(&eval_set.targets, &vocab),
        };

        tracing::info!(
            "Model {} trained: accuracy {:.3} over {} samples in {:.1}s",
            model_id,
            metrics.accuracy,
            metrics.evaluated_samples,
            metrics.training_time
        );

        Ok(TrainedArtifact {
            model_id: model_id.clone(),
            version: ArtifactVersion::new(),
            classes: vocab.classes().to_vec(),
            input_dim,
            classifier: config.classifier.clone(),
            scaler,
            validator,
            tensors: export_varmap(&varmap).map_err(training_error)?,
            metrics,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn optimize(
        &self,
        model_id: &ModelId,
        model: &GestureClassifier,
        varmap: &VarMap,
        train: &Tensors,
        test: Option<&Tensors>,
        epochs: usize,
        device: &Device,
        rng: &mut StdRng,
        observer: &dyn TrainingObserver,
    ) -> Result<FitOutcome> {
        let config = &self.config;
        let weights = class_weights(&train.targets, model.n_classes());
        let weights = Tensor::from_vec(weights, model.n_classes(), device).map_err(training_error)?;

        let mut lr = config.classifier.learning_rate;
        let mut optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr,
                weight_decay: 0.0,
                ..Default::default()
            },
        )
        .map_err(training_error)?;

        let batch = batch_size(train.len());
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut history = Vec::with_capacity(epochs);
        let mut best_loss = f64::INFINITY;
        let mut best_weights = None;
        let mut wait = 0usize;
        let mut lr_wait = 0usize;
        let mut stopped_early = false;

        for epoch in 1..=epochs {
            if observer.is_cancelled() {
                tracing::info!("Training of {} cancelled at epoch {}", model_id, epoch);
                return Err(Error::Cancelled(model_id.to_string()));
            }

            order.shuffle(rng);
            let (loss, acc) = self
                .train_epoch(model, &mut optimizer, train, &order, batch, &weights, device)
                .map_err(training_error)?;

            let (val_loss, val_accuracy) = match test {
                Some(test) => {
                    let (l, a, _) = evaluate(model, test).map_err(training_error)?;
                    (Some(l), Some(a))
                }
                None => (None, None),
            };

            let record = EpochRecord {
                epoch,
                accuracy: acc,
                loss,
                val_accuracy,
                val_loss,
            };
            tracing::debug!(
                "Epoch {}/{}: loss {:.4} acc {:.3} val_loss {:?}",
                epoch,
                epochs,
                loss,
                acc,
                val_loss
            );
            observer.on_epoch(epoch, epochs, &record);
            history.push(record);

            let monitored = val_loss.unwrap_or(loss);
            if monitored < best_loss {
                best_loss = monitored;
                best_weights = Some(snapshot(varmap).map_err(training_error)?);
                wait = 0;
                lr_wait = 0;
                continue;
            }

            wait += 1;
            lr_wait += 1;
            if wait >= config.early_stopping_patience {
                tracing::info!("Early stopping {} after epoch {}", model_id, epoch);
                stopped_early = true;
                break;
            }
            if lr_wait >= config.lr_patience {
                let reduced = (lr * config.lr_factor).max(config.min_lr);
                if reduced < lr {
                    tracing::debug!("Reducing learning rate to {:e}", reduced);
                    lr = reduced;
                    optimizer.set_learning_rate(lr);
                }
                lr_wait = 0;
            }
        }

        if let Some(weights) = best_weights {
            restore(varmap, &weights).map_err(training_error)?;
        }

        Ok(FitOutcome {
            history,
            stopped_early,
        })
    }

    /// One pass over the shuffled training rows. Returns mean weighted loss
    /// and accuracy with dropout active.
    #[allow(clippy::too_many_arguments)]
    fn train_epoch(
        &self,
        model: &GestureClassifier,
        optimizer: &mut AdamW,
        train: &Tensors,
        order: &[usize],
        batch: usize,
        weights: &Tensor,
        device: &Device,
    ) -> candle_core::Result<(f64, f64)> {
        let mut total_loss = 0.0f64;
        let mut correct = 0usize;

        for chunk in order.chunks(batch) {
            let data = train.select(chunk, device)?;
            let logits = model.forward(&data.xs, true)?;
            let loss = weighted_cross_entropy(&logits, &data.ys, weights)?;
            optimizer.backward_step(&loss)?;

            total_loss += loss.to_scalar::<f32>()? as f64 * chunk.len() as f64;
            let predicted = logits.argmax(D::Minus1)?.to_vec1::<u32>()?;
            correct += predicted
                .iter()
                .zip(&data.targets)
                .filter(|(p, t)| p == t)
                .count();
        }

        let n = order.len().max(1) as f64;
        Ok((total_loss / n, correct as f64 / n))
    }

    fn filter_outliers_per_label(&self, positives: PositiveSet, threshold: f64) -> PositiveSet {
        let mut grouped: BTreeMap<String, Vec<Vec<sign_core::Landmark>>> = BTreeMap::new();
        for (hand, label) in positives.hands.iter().zip(&positives.labels) {
            grouped
                .entry(label.clone())
                .or_default()
                .push(hand.points().to_vec());
        }

        let mut filtered = PositiveSet {
            dropped: positives.dropped,
            ..Default::default()
        };
        for (label, sets) in grouped {
            let kept = filter_outliers(&sets, threshold);
            if kept.len() < sets.len() {
                tracing::debug!("Filtered {} outliers for {}", sets.len() - kept.len(), label);
            }
            for points in kept {
                if let Ok(hand) = HandLandmarks::new(points) {
                    filtered.push(hand, label.clone(), &self.extractor);
                }
            }
        }
        filtered
    }

    fn add_augmented(&self, positives: &mut PositiveSet, rng: &mut StdRng) {
        let originals: Vec<(HandLandmarks, String)> = positives
            .hands
            .iter()
            .cloned()
            .zip(positives.labels.iter().cloned())
            .collect();

        for (hand, label) in originals {
            for _ in 0..self.config.augment_copies {
                let jittered = augment(hand.points(), &self.config.augmentation, rng);
                if let Ok(copy) = HandLandmarks::new_finite(jittered) {
                    positives.push(copy, label.clone(), &self.extractor);
                }
            }
        }
    }
}
