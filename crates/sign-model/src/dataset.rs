//! Training-set assembly: sample validation, label vocabulary, stratified
//! splitting and class balancing.

use std::collections::{BTreeMap, BTreeSet};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use sign_core::{
    Error, FeatureExtractor, HandLandmarks, Result, TrainingSample, SENTINEL_LABEL,
};

/// Ordered class list; the sentinel is always last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelVocabulary {
    classes: Vec<String>,
}

impl LabelVocabulary {
    /// Real labels in sorted order followed by the sentinel. Any label equal
    /// to the sentinel is ignored.
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let real: BTreeSet<&str> = labels
            .into_iter()
            .filter(|l| *l != SENTINEL_LABEL)
            .collect();
        let mut classes: Vec<String> = real.into_iter().map(str::to_string).collect();
        classes.push(SENTINEL_LABEL.to_string());
        Self { classes }
    }

    pub fn from_classes(classes: Vec<String>) -> Self {
        Self { classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn real_labels(&self) -> &[String] {
        &self.classes[..self.classes.len().saturating_sub(1)]
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn sentinel_index(&self) -> usize {
        self.classes.len() - 1
    }

    pub fn index_of(&self, label: &str) -> Option<u32> {
        self.classes.iter().position(|c| c == label).map(|i| i as u32)
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }
}

/// Positive samples that survived validation, with their features.
#[derive(Debug, Clone, Default)]
pub struct PositiveSet {
    pub features: Vec<Vec<f32>>,
    pub labels: Vec<String>,
    /// Raw poses kept for preprocessing steps that work on landmarks
    pub hands: Vec<HandLandmarks>,
    pub dropped: usize,
}

impl PositiveSet {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Distinct labels other than the sentinel.
    pub fn distinct_labels(&self) -> usize {
        self.labels
            .iter()
            .filter(|l| l.as_str() != SENTINEL_LABEL)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn push(&mut self, hand: HandLandmarks, label: String, extractor: &FeatureExtractor) {
        self.features
            .push(extractor.extract_hand(&hand).into_inner());
        self.labels.push(label);
        self.hands.push(hand);
    }
}

/// Extract features from every valid sample. Samples without exactly 21
/// finite landmarks, or labelled with the reserved sentinel, are skipped and
/// counted, never fatal.
pub fn prepare_positives(samples: &[TrainingSample], extractor: &FeatureExtractor) -> PositiveSet {
    let mut set = PositiveSet::default();

    for (i, sample) in samples.iter().enumerate() {
        if sample.label == SENTINEL_LABEL {
            tracing::debug!("Skipping sample {}: label {} is reserved", i, SENTINEL_LABEL);
            set.dropped += 1;
            continue;
        }
        match HandLandmarks::new_finite(sample.landmarks.clone()) {
            Ok(hand) => set.push(hand, sample.label.clone(), extractor),
            Err(e) => {
                tracing::debug!("Skipping sample {} ({}): {}", i, sample.label, e);
                set.dropped += 1;
            }
        }
    }

    set
}

/// Fail unless there is data and at least two real labels.
pub fn check_sufficient(set: &PositiveSet) -> Result<()> {
    if set.is_empty() {
        return Err(Error::InsufficientData {
            required: 1,
            available: 0,
        });
    }
    let distinct = set.distinct_labels();
    if distinct < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            available: distinct,
        });
    }
    Ok(())
}

/// Indices of the train and held-out partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl Split {
    pub fn all(n: usize) -> Self {
        Self {
            train: (0..n).collect(),
            test: Vec::new(),
        }
    }

    pub fn has_holdout(&self) -> bool {
        !self.test.is_empty()
    }
}

/// Stratified split holding out `test_fraction` of every class.
///
/// Each class contributes `round(count * test_fraction)` test samples but
/// always keeps at least one training sample, so singleton classes never
/// reach the held-out set.
pub fn stratified_split<R: Rng + ?Sized>(
    targets: &[u32],
    test_fraction: f64,
    rng: &mut R,
) -> Split {
    let mut by_class: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (i, &t) in targets.iter().enumerate() {
        by_class.entry(t).or_default().push(i);
    }

    let mut split = Split::default();
    for (_, mut indices) in by_class {
        indices.shuffle(rng);
        let n = indices.len();
        let n_test = ((n as f64 * test_fraction).round() as usize).min(n.saturating_sub(1));
        split.test.extend_from_slice(&indices[..n_test]);
        split.train.extend_from_slice(&indices[n_test..]);
    }

    split.train.shuffle(rng);
    split.test.sort_unstable();
    split
}

/// Weights `total / (num_classes * class_count)` indexed by class id.
///
/// Classes absent from `targets` get weight 0 and `num_classes` counts only
/// the classes present.
pub fn class_weights(targets: &[u32], n_classes: usize) -> Vec<f32> {
    let mut counts = vec![0usize; n_classes];
    for &t in targets {
        if let Some(c) = counts.get_mut(t as usize) {
            *c += 1;
        }
    }
    let present = counts.iter().filter(|&&c| c > 0).count();
    let total = targets.len() as f32;

    counts
        .iter()
        .map(|&c| {
            if c == 0 {
                0.0
            } else {
                total / (present as f32 * c as f32)
            }
        })
        .collect()
}

/// Epoch budget scaled by the number of positive samples.
pub fn epoch_budget(n_positive: usize) -> usize {
    (n_positive / 2).clamp(30, 150)
}

/// Mini-batch size scaled by the number of training rows.
pub fn batch_size(n_train: usize) -> usize {
    (n_train / 10).clamp(4, 16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use sign_core::Landmark;

    fn hand(offset: f64) -> Vec<Landmark> {
        (0..21)
            .map(|i| Landmark::new(0.4 + offset + i as f64 * 0.01, 0.6 - i as f64 * 0.01, 0.0))
            .collect()
    }

    #[test]
    fn test_vocabulary_sentinel_last() {
        let vocab = LabelVocabulary::from_labels(["b", "a", "b", SENTINEL_LABEL]);
        assert_eq!(vocab.classes(), &["a", "b", SENTINEL_LABEL]);
        assert_eq!(vocab.real_labels(), &["a", "b"]);
        assert_eq!(vocab.sentinel_index(), 2);
        assert_eq!(vocab.index_of("b"), Some(1));
    }

    #[test]
    fn test_prepare_drops_invalid_samples() {
        let mut bad = hand(0.0);
        bad[3].z = f64::NAN;
        let samples = vec![
            TrainingSample::new("a", hand(0.0)),
            TrainingSample::new("a", hand(0.0)[..20].to_vec()),
            TrainingSample::new("b", bad),
            TrainingSample::new("b", hand(0.1)),
        ];
        let set = prepare_positives(&samples, &FeatureExtractor::new());
        assert_eq!(set.len(), 2);
        assert_eq!(set.dropped, 2);
        assert!(check_sufficient(&set).is_ok());
    }

    #[test]
    fn test_reserved_label_is_dropped() {
        let mut samples = vec![TrainingSample::new("a", hand(0.0)); 6];
        samples.extend(vec![TrainingSample::new(SENTINEL_LABEL, hand(0.1)); 6]);

        let set = prepare_positives(&samples, &FeatureExtractor::new());
        assert_eq!(set.len(), 6);
        assert_eq!(set.dropped, 6);
        assert!(set.labels.iter().all(|l| l != SENTINEL_LABEL));
        assert!(matches!(
            check_sufficient(&set),
            Err(Error::InsufficientData { required: 2, available: 1 })
        ));
    }

    #[test]
    fn test_single_label_is_insufficient() {
        let samples = vec![TrainingSample::new("a", hand(0.0)); 5];
        let set = prepare_positives(&samples, &FeatureExtractor::new());
        assert!(matches!(
            check_sufficient(&set),
            Err(Error::InsufficientData { required: 2, available: 1 })
        ));
        assert!(matches!(
            check_sufficient(&PositiveSet::default()),
            Err(Error::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_stratified_split_keeps_proportions() {
        let targets: Vec<u32> = [vec![0; 10], vec![1; 10], vec![2; 5]].concat();
        let mut rng = StdRng::seed_from_u64(42);
        let split = stratified_split(&targets, 0.2, &mut rng);

        assert_eq!(split.train.len() + split.test.len(), 25);
        let test_counts = |class: u32| split.test.iter().filter(|&&i| targets[i] == class).count();
        assert_eq!(test_counts(0), 2);
        assert_eq!(test_counts(1), 2);
        assert_eq!(test_counts(2), 1);
    }

    #[test]
    fn test_singleton_class_stays_in_train() {
        let targets = vec![0, 0, 0, 0, 0, 1];
        let mut rng = StdRng::seed_from_u64(1);
        let split = stratified_split(&targets, 0.2, &mut rng);
        assert!(split.train.contains(&5));
    }

    #[test]
    fn test_class_weights_inverse_frequency() {
        let weights = class_weights(&[0, 0, 0, 1], 3);
        assert!((weights[0] - 4.0 / 6.0).abs() < 1e-6);
        assert!((weights[1] - 2.0).abs() < 1e-6);
        assert_eq!(weights[2], 0.0);
    }

    #[test]
    fn test_budgets() {
        assert_eq!(epoch_budget(12), 30);
        assert_eq!(epoch_budget(200), 100);
        assert_eq!(epoch_budget(1000), 150);
        assert_eq!(batch_size(13), 4);
        assert_eq!(batch_size(120), 12);
        assert_eq!(batch_size(1000), 16);
    }
}
