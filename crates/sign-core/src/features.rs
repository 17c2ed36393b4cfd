//! Feature extraction from raw hand geometry.
//!
//! Layout of the fixed-width vector:
//!
//! | range   | content                                      |
//! |---------|----------------------------------------------|
//! | 0..63   | wrist-relative x, y, z of all 21 landmarks   |
//! | 63..68  | fingertip-to-base distances                  |
//! | 68..73  | wrist-to-fingertip distances                 |
//! | 73..78  | first five joint angles (thumb, index, ...)  |
//!
//! The raw list is 83 values long. It is right-truncated to
//! [`FEATURE_DIM`], so the angles of the ring and little fingers never make
//! it into the vector. Trained artifacts depend on this width.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::joint_angle;
use crate::types::{HandLandmarks, Landmark, FINGERTIPS, FINGER_BASES, FINGER_CHAINS, WRIST};

/// Width of every feature vector.
pub const FEATURE_DIM: usize = 78;

/// Number of wrist-relative coordinate features.
pub const COORDINATE_FEATURES: usize = 63;

/// Fixed-width feature vector derived from one hand pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    /// Pad with zeros or truncate to [`FEATURE_DIM`].
    pub fn from_raw(mut values: Vec<f32>) -> Self {
        values.resize(FEATURE_DIM, 0.0);
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn coordinates(&self) -> &[f32] {
        &self.0[..COORDINATE_FEATURES]
    }
}

impl TryFrom<Vec<f32>> for FeatureVector {
    type Error = Error;

    fn try_from(values: Vec<f32>) -> Result<Self> {
        if values.len() != FEATURE_DIM {
            return Err(Error::InvalidInput(format!(
                "feature vector must have {} values, got {}",
                FEATURE_DIM,
                values.len()
            )));
        }
        Ok(Self(values))
    }
}

impl From<FeatureVector> for Vec<f32> {
    fn from(v: FeatureVector) -> Self {
        v.0
    }
}

/// Deterministic landmark-to-feature transform
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract from an unchecked landmark slice.
    pub fn extract(&self, landmarks: &[Landmark]) -> Result<FeatureVector> {
        let hand = HandLandmarks::try_from(landmarks)?;
        Ok(self.extract_hand(&hand))
    }

    pub fn extract_hand(&self, hand: &HandLandmarks) -> FeatureVector {
        FeatureVector::from_raw(Self::raw_features(hand))
    }

    /// Full 83-value list before the width is fixed.
    pub fn raw_features(hand: &HandLandmarks) -> Vec<f32> {
        let mut features = Vec::with_capacity(83);
        let wrist = hand.get(WRIST);

        for p in hand.points() {
            features.push((p.x - wrist.x) as f32);
            features.push((p.y - wrist.y) as f32);
            features.push((p.z - wrist.z) as f32);
        }

        for (&tip, &base) in FINGERTIPS.iter().zip(FINGER_BASES.iter()) {
            features.push(hand.get(tip).distance_to(hand.get(base)) as f32);
        }

        for &tip in &FINGERTIPS {
            features.push(wrist.distance_to(hand.get(tip)) as f32);
        }

        for chain in &FINGER_CHAINS {
            for w in chain.windows(3) {
                let angle = joint_angle(hand.get(w[0]), hand.get(w[1]), hand.get(w[2]));
                features.push(angle as f32);
            }
        }

        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_hand() -> Vec<Landmark> {
        (0..21usize)
            .map(|i| {
                let finger = i.saturating_sub(1) / 4;
                let joint = if i == 0 { 0 } else { (i - 1) % 4 + 1 };
                Landmark::new(
                    0.5 + finger as f64 * 0.04 - 0.08,
                    0.8 - joint as f64 * 0.06,
                    -0.01 * joint as f64,
                )
            })
            .collect()
    }

    #[test]
    fn test_length_is_fixed() {
        let hand = HandLandmarks::new(open_hand()).unwrap();
        assert_eq!(FeatureExtractor::raw_features(&hand).len(), 83);
        let features = FeatureExtractor::new().extract(&open_hand()).unwrap();
        assert_eq!(features.len(), FEATURE_DIM);
    }

    #[test]
    fn test_wrong_count_is_invalid_input() {
        let mut pts = open_hand();
        pts.pop();
        assert!(matches!(
            FeatureExtractor::new().extract(&pts),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_deterministic() {
        let extractor = FeatureExtractor::new();
        let a = extractor.extract(&open_hand()).unwrap();
        let b = extractor.extract(&open_hand()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_translation_invariance_of_coordinates() {
        let extractor = FeatureExtractor::new();
        let hand = HandLandmarks::new(open_hand()).unwrap();
        let moved = hand.translated(0.125, -0.25, 0.0625);

        let a = extractor.extract_hand(&hand);
        let b = extractor.extract_hand(&moved);
        for (x, y) in a.coordinates().iter().zip(b.coordinates()) {
            assert!((x - y).abs() < 1e-5);
        }
        // the wrist itself is always the origin
        assert_eq!(&a.as_slice()[..3], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_truncation_keeps_first_five_angles() {
        let hand = HandLandmarks::new(open_hand()).unwrap();
        let raw = FeatureExtractor::raw_features(&hand);
        let fixed = FeatureExtractor::new().extract_hand(&hand);
        assert_eq!(&raw[..FEATURE_DIM], fixed.as_slice());
    }

    #[test]
    fn test_from_raw_pads_short_input() {
        let v = FeatureVector::from_raw(vec![1.0; 10]);
        assert_eq!(v.len(), FEATURE_DIM);
        assert_eq!(v.as_slice()[77], 0.0);
        assert!(FeatureVector::try_from(vec![0.0; 5]).is_err());
    }
}
