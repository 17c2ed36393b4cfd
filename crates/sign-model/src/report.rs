//! Training metrics persisted with every artifact.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dataset::LabelVocabulary;

/// One row of the per-epoch training history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochRecord {
    pub epoch: usize,
    pub accuracy: f64,
    pub loss: f64,
    pub val_accuracy: Option<f64>,
    pub val_loss: Option<f64>,
}

/// Per-class precision/recall/F1 on the evaluation set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingMetrics {
    /// Held-out accuracy, or final training accuracy without a held-out set
    pub accuracy: f64,
    /// Rows used for training and evaluation, synthetic negatives included
    pub total_samples: usize,
    /// Rows the accuracy was measured on
    pub evaluated_samples: usize,
    /// Wall-clock seconds
    pub training_time: f64,
    pub training_history: Vec<EpochRecord>,
    /// Keyed by real label; empty without a held-out set
    pub confusion_matrix: BTreeMap<String, ClassMetrics>,
    pub class_distribution: BTreeMap<String, usize>,
    pub epochs_run: usize,
    pub stopped_early: bool,
}

impl TrainingMetrics {
    pub fn has_holdout_report(&self) -> bool {
        !self.confusion_matrix.is_empty()
    }
}

/// Fraction of matching positions; 0 for empty input.
pub fn accuracy(y_true: &[u32], y_pred: &[u32]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Per-class report over real labels. The sentinel class is omitted.
pub fn classification_report(
    y_true: &[u32],
    y_pred: &[u32],
    vocab: &LabelVocabulary,
) -> BTreeMap<String, ClassMetrics> {
    let mut report = BTreeMap::new();

    for (class, label) in vocab.real_labels().iter().enumerate() {
        let class = class as u32;
        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut fn_ = 0usize;
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t == class, p == class) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        report.insert(
            label.clone(),
            ClassMetrics {
                precision,
                recall,
                f1_score,
                support: tp + fn_,
            },
        );
    }

    report
}

/// Label counts over the given targets, sentinel included.
pub fn class_distribution(targets: &[u32], vocab: &LabelVocabulary) -> BTreeMap<String, usize> {
    let mut dist = BTreeMap::new();
    for &t in targets {
        if let Some(label) = vocab.label(t as usize) {
            *dist.entry(label.to_string()).or_insert(0) += 1;
        }
    }
    dist
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
