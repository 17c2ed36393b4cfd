//! Fundamental types for hand-sign recognition.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Number of tracked points in one hand pose.
pub const LANDMARK_COUNT: usize = 21;

/// Index of the wrist landmark.
pub const WRIST: usize = 0;

/// Fingertip indices, thumb first.
pub const FINGERTIPS: [usize; 5] = [4, 8, 12, 16, 20];

/// Finger-base indices paired with [`FINGERTIPS`].
pub const FINGER_BASES: [usize; 5] = [3, 6, 10, 14, 18];

/// Four-point joint chains, one per finger.
pub const FINGER_CHAINS: [[usize; 4]; 5] = [
    [1, 2, 3, 4],
    [5, 6, 7, 8],
    [9, 10, 11, 12],
    [13, 14, 15, 16],
    [17, 18, 19, 20],
];

/// Reserved class injected during training to learn "no gesture".
pub const SENTINEL_LABEL: &str = "NO_GESTURE";

/// Soft-rejection label for ambiguous or out-of-distribution input.
pub const NO_CLEAR_GESTURE: &str = "no clear gesture";

/// Soft-rejection label for implausible hand geometry.
pub const POSE_NOT_DETECTED: &str = "pose not detected";

/// Prediction label used by the fixed error comparison result.
pub const ERROR_LABEL: &str = "Error";

/// Identifier of one trained model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelId(pub String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ModelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One tracked 3-D point in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_nalgebra(&self) -> Point3<f64> {
        Point3::new(self.x, self.y, self.z)
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn distance_to(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Distance in the image plane, ignoring depth.
    pub fn planar_distance_to(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// A validated hand pose of exactly [`LANDMARK_COUNT`] points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Landmark>", into = "Vec<Landmark>")]
pub struct HandLandmarks {
    points: Vec<Landmark>,
}

impl HandLandmarks {
    pub fn new(points: Vec<Landmark>) -> Result<Self> {
        check_count(&points)?;
        Ok(Self { points })
    }

    /// Like [`HandLandmarks::new`] but also rejects NaN or infinite coordinates.
    pub fn new_finite(points: Vec<Landmark>) -> Result<Self> {
        let hand = Self::new(points)?;
        if let Some(idx) = hand.points.iter().position(|p| !p.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "landmark {} has a non-numeric coordinate",
                idx
            )));
        }
        Ok(hand)
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    pub fn wrist(&self) -> &Landmark {
        &self.points[WRIST]
    }

    pub fn get(&self, index: usize) -> &Landmark {
        &self.points[index]
    }

    pub fn fingertips(&self) -> impl Iterator<Item = &Landmark> {
        FINGERTIPS.iter().map(move |&i| &self.points[i])
    }

    pub fn translated(&self, dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|p| Landmark::new(p.x + dx, p.y + dy, p.z + dz))
                .collect(),
        }
    }
}

impl TryFrom<Vec<Landmark>> for HandLandmarks {
    type Error = Error;

    fn try_from(points: Vec<Landmark>) -> Result<Self> {
        Self::new(points)
    }
}

impl TryFrom<&[Landmark]> for HandLandmarks {
    type Error = Error;

    fn try_from(points: &[Landmark]) -> Result<Self> {
        Self::new(points.to_vec())
    }
}

impl From<HandLandmarks> for Vec<Landmark> {
    fn from(hand: HandLandmarks) -> Self {
        hand.points
    }
}

fn check_count(points: &[Landmark]) -> Result<()> {
    if points.len() != LANDMARK_COUNT {
        return Err(Error::InvalidInput(format!(
            "expected {} landmarks, got {}",
            LANDMARK_COUNT,
            points.len()
        )));
    }
    Ok(())
}

/// Parse a raw JSON landmark list (`[{"x":..,"y":..,"z":..}, ...]`).
///
/// Rows written by older clients hold the list as a JSON-encoded string,
/// which is decoded first. Any point that is not an object with numeric
/// `x`, `y` and `z` fails the whole list. The count is not checked here.
pub fn parse_landmarks(value: &serde_json::Value) -> Result<Vec<Landmark>> {
    if let Some(text) = value.as_str() {
        let decoded: serde_json::Value = serde_json::from_str(text)?;
        if decoded.is_string() {
            return Err(Error::InvalidInput("landmarks must be a list".to_string()));
        }
        return parse_landmarks(&decoded);
    }

    let items = value
        .as_array()
        .ok_or_else(|| Error::InvalidInput("landmarks must be a list".to_string()))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let coord = |key: &str| {
                item.get(key).and_then(|v| v.as_f64()).ok_or_else(|| {
                    Error::InvalidInput(format!("landmark {} is missing numeric '{}'", i, key))
                })
            };
            Ok(Landmark::new(coord("x")?, coord("y")?, coord("z")?))
        })
        .collect()
}

/// Sample supplied by the training corpus reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSample {
    pub label: String,
    pub landmarks: Vec<Landmark>,
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl TrainingSample {
    pub fn new(label: impl Into<String>, landmarks: Vec<Landmark>) -> Self {
        Self {
            label: label.into(),
            landmarks,
            image_data: None,
            created_at: None,
        }
    }
}

/// Historical sample as kept by the dataset store.
///
/// Landmarks stay as raw JSON because stored rows may be malformed; callers
/// decide how to treat parse failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSample {
    pub id: String,
    pub label: String,
    pub landmarks: serde_json::Value,
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl StoredSample {
    pub fn from_landmarks(label: impl Into<String>, landmarks: &[Landmark]) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            label: label.into(),
            landmarks: serde_json::to_value(landmarks).unwrap_or(serde_json::Value::Null),
            image_data: None,
            created_at: Some(Utc::now()),
        }
    }

    pub fn parsed_landmarks(&self) -> Result<Vec<Landmark>> {
        parse_landmarks(&self.landmarks)
    }
}

/// How a prediction was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionOutcome {
    Gesture,
    NoClearGesture,
    PoseNotDetected,
}

/// Result of classifying one live hand pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction: String,
    pub confidence: f64,
    pub probabilities: BTreeMap<String, f64>,
    pub outcome: PredictionOutcome,
}

impl PredictionResult {
    pub fn pose_not_detected() -> Self {
        Self {
            prediction: POSE_NOT_DETECTED.to_string(),
            confidence: 0.0,
            probabilities: BTreeMap::new(),
            outcome: PredictionOutcome::PoseNotDetected,
        }
    }

    pub fn is_rejection(&self) -> bool {
        self.outcome != PredictionOutcome::Gesture
    }
}

/// Detection quality tier reported with a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Error,
}

impl DetectionQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionQuality::Excellent => "excellent",
            DetectionQuality::Good => "good",
            DetectionQuality::Fair => "fair",
            DetectionQuality::Poor => "poor",
            DetectionQuality::Error => "error",
        }
    }
}

/// Result of comparing a practice attempt against a target label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub prediction: String,
    pub confidence: f64,
    pub is_match: bool,
    pub feedback: String,
    pub similarity: f64,
    pub timestamp: DateTime<Utc>,
    pub detection_quality: DetectionQuality,
}

impl ComparisonResult {
    /// Fixed result returned when a comparison could not be carried out.
    pub fn error(reason: impl fmt::Display) -> Self {
        Self {
            prediction: ERROR_LABEL.to_string(),
            confidence: 0.0,
            is_match: false,
            feedback: format!("Comparison failed: {}", reason),
            similarity: 0.0,
            timestamp: Utc::now(),
            detection_quality: DetectionQuality::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.detection_quality == DetectionQuality::Error
    }
}
