//! Out-of-distribution rejection.
//!
//! A prediction is only trusted when the winning class is a real label, its
//! probability clears a floor, and the distribution is not too flat.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sign_core::{
    Error, Landmark, PredictionOutcome, PredictionResult, Result, FINGERTIPS, LANDMARK_COUNT,
    NO_CLEAR_GESTURE, SENTINEL_LABEL, WRIST,
};

const ENTROPY_EPSILON: f64 = 1e-10;

/// Shannon entropy with every term smoothed by a small epsilon.
pub fn entropy(probs: &[f32]) -> f64 {
    -probs
        .iter()
        .map(|&p| {
            let p = p as f64 + ENTROPY_EPSILON;
            p * p.ln()
        })
        .sum::<f64>()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    LowConfidence,
    HighEntropy,
    Sentinel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RejectionPolicy {
    /// Minimum winning probability
    pub min_confidence: f64,
    /// Maximum entropy in nats
    pub max_entropy: f64,
}

impl Default for RejectionPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            max_entropy: 2.5,
        }
    }
}

impl RejectionPolicy {
    /// Why `probs` should be rejected, if at all.
    pub fn check(
        &self,
        probs: &[f32],
        winner: usize,
        sentinel: Option<usize>,
    ) -> Option<RejectionReason> {
        let confidence = probs.get(winner).copied().unwrap_or(0.0) as f64;
        if confidence < self.min_confidence {
            Some(RejectionReason::LowConfidence)
        } else if entropy(probs) > self.max_entropy {
            Some(RejectionReason::HighEntropy)
        } else if Some(winner) == sentinel {
            Some(RejectionReason::Sentinel)
        } else {
            None
        }
    }

    /// Turn raw class probabilities into a prediction.
    ///
    /// `classes` and `probs` are parallel. Rejections report the raw maximum
    /// as confidence and the non-sentinel probabilities unnormalized;
    /// accepted predictions renormalize the non-sentinel probabilities.
    pub fn apply(&self, probs: &[f32], classes: &[String]) -> Result<PredictionResult> {
        if probs.len() != classes.len() || probs.is_empty() {
            return Err(Error::Inference(format!(
                "Classifier returned {} probabilities for {} classes",
                probs.len(),
                classes.len()
            )));
        }
        if probs.iter().any(|p| !p.is_finite()) {
            return Err(Error::Inference(
                "Classifier returned non-finite probabilities".to_string(),
            ));
        }

        let mut winner = 0;
        for (i, &p) in probs.iter().enumerate() {
            if p > probs[winner] {
                winner = i;
            }
        }
        let confidence = probs[winner] as f64;
        let sentinel = classes.iter().position(|c| c == SENTINEL_LABEL);

        let real: Vec<(&String, f64)> = classes
            .iter()
            .zip(probs)
            .enumerate()
            .filter(|(i, _)| Some(*i) != sentinel)
            .map(|(_, (c, &p))| (c, p as f64))
            .collect();

        if let Some(reason) = self.check(probs, winner, sentinel) {
            tracing::debug!(
                "Rejected prediction {} ({:.3}): {:?}",
                classes[winner],
                confidence,
                reason
            );
            return Ok(PredictionResult {
                prediction: NO_CLEAR_GESTURE.to_string(),
                confidence,
                probabilities: real.into_iter().map(|(c, p)| (c.clone(), p)).collect(),
                outcome: PredictionOutcome::NoClearGesture,
            });
        }

        let total: f64 = real.iter().map(|(_, p)| p).sum();
        let probabilities: BTreeMap<String, f64> = real
            .into_iter()
            .map(|(c, p)| (c.clone(), if total > 0.0 { p / total } else { 0.0 }))
            .collect();

        Ok(PredictionResult {
            prediction: classes[winner].clone(),
            confidence,
            probabilities,
            outcome: PredictionOutcome::Gesture,
        })
    }
}

/// Result of the hand-pose plausibility check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseCheck {
    Plausible,
    Implausible,
    /// Coordinates could not be evaluated
    Indeterminate,
}

/// A pose is plausible when at least two fingertips sit a sane distance
/// from the wrist.
pub fn pose_check(points: &[Landmark]) -> PoseCheck {
    if points.len() != LANDMARK_COUNT || points.iter().any(|p| !p.is_finite()) {
        return PoseCheck::Indeterminate;
    }
    let wrist = &points[WRIST];
    let valid = FINGERTIPS
        .iter()
        .filter(|&&tip| {
            let d = points[tip].distance_to(wrist);
            d > 0.01 && d < 1.0
        })
        .count();

    if valid >= 2 {
        PoseCheck::Plausible
    } else {
        PoseCheck::Implausible
    }
}
