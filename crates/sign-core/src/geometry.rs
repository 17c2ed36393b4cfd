//! Geometric utilities over hand landmarks.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::types::{HandLandmarks, Landmark, FINGERTIPS, WRIST};

/// Axis-aligned box in the image plane
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox2D {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox2D {
    /// Zero-sized box at the origin when `points` is empty.
    pub fn from_points(points: &[Landmark]) -> Self {
        if points.is_empty() {
            return Self::default();
        }

        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Angle at `vertex` formed by the bones towards `a` and `b`, in radians.
///
/// The cosine is computed with a small epsilon in the denominator so a
/// degenerate (zero-length) bone yields pi/2 rather than NaN.
pub fn joint_angle(a: &Landmark, vertex: &Landmark, b: &Landmark) -> f64 {
    let v1: Vector3<f64> = a.to_vector() - vertex.to_vector();
    let v2: Vector3<f64> = b.to_vector() - vertex.to_vector();
    let cos = v1.dot(&v2) / (v1.norm() * v2.norm() + 1e-6);
    cos.clamp(-1.0, 1.0).acos()
}

/// 3-D wrist-to-fingertip distances, thumb first.
pub fn fingertip_distances(hand: &HandLandmarks) -> [f64; 5] {
    let wrist = hand.get(WRIST);
    FINGERTIPS.map(|tip| wrist.distance_to(hand.get(tip)))
}

/// Planar wrist-to-fingertip distances, thumb first.
pub fn planar_fingertip_distances(points: &[Landmark]) -> Option<[f64; 5]> {
    let wrist = points.get(WRIST)?;
    let mut out = [0.0; 5];
    for (slot, &tip) in out.iter_mut().zip(FINGERTIPS.iter()) {
        *slot = wrist.planar_distance_to(points.get(tip)?);
    }
    Some(out)
}

/// Largest planar wrist-to-fingertip distance.
pub fn hand_span(points: &[Landmark]) -> Option<f64> {
    planar_fingertip_distances(points).map(|d| d.iter().copied().fold(0.0, f64::max))
}

/// Mean per-point 3-D distance between two poses of equal length.
pub fn mean_point_distance(a: &[Landmark], b: &[Landmark]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let total: f64 = a.iter().zip(b).map(|(p, q)| p.distance_to(q)).sum();
    Some(total / a.len() as f64)
}
