//! Landmark-level preprocessing: normalization, augmentation and outlier
//! filtering of raw training poses.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{Landmark, LANDMARK_COUNT, WRIST};

/// Random rigid jitter applied in the image plane
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Maximum rotation about the z axis (radians)
    pub rotation_range: f64,
    /// Maximum translation along x and y
    pub translation_range: f64,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation_range: 0.1,
            translation_range: 0.05,
        }
    }
}

/// Shift every landmark so the wrist sits at the origin.
pub fn normalize_to_wrist(points: &[Landmark]) -> Vec<Landmark> {
    let Some(wrist) = points.get(WRIST).copied() else {
        return Vec::new();
    };
    points
        .iter()
        .map(|p| Landmark::new(p.x - wrist.x, p.y - wrist.y, p.z - wrist.z))
        .collect()
}

/// Rotate about the origin and translate in x/y; depth is untouched.
pub fn augment<R: Rng + ?Sized>(
    points: &[Landmark],
    config: &AugmentationConfig,
    rng: &mut R,
) -> Vec<Landmark> {
    let angle = sample_symmetric(rng, config.rotation_range);
    let tx = sample_symmetric(rng, config.translation_range);
    let ty = sample_symmetric(rng, config.translation_range);
    let (sin, cos) = angle.sin_cos();

    points
        .iter()
        .map(|p| {
            let x = p.x * cos - p.y * sin;
            let y = p.x * sin + p.y * cos;
            Landmark::new(x + tx, y + ty, p.z)
        })
        .collect()
}

fn sample_symmetric<R: Rng + ?Sized>(rng: &mut R, range: f64) -> f64 {
    if range <= 0.0 {
        0.0
    } else {
        rng.gen_range(-range..range)
    }
}

/// Drop poses where any coordinate deviates from the per-landmark mean by
/// more than `threshold` standard deviations.
///
/// Sets with fewer than three poses, or where every pose would be dropped,
/// are returned unchanged. Poses must all have [`LANDMARK_COUNT`] points.
pub fn filter_outliers(sets: &[Vec<Landmark>], threshold: f64) -> Vec<Vec<Landmark>> {
    if sets.len() < 3 || sets.iter().any(|s| s.len() != LANDMARK_COUNT) {
        return sets.to_vec();
    }

    let n = sets.len() as f64;
    let mut mean = [[0.0f64; 3]; LANDMARK_COUNT];
    let mut std = [[0.0f64; 3]; LANDMARK_COUNT];

    for set in sets {
        for (i, p) in set.iter().enumerate() {
            mean[i][0] += p.x / n;
            mean[i][1] += p.y / n;
            mean[i][2] += p.z / n;
        }
    }
    for set in sets {
        for (i, p) in set.iter().enumerate() {
            std[i][0] += (p.x - mean[i][0]).powi(2) / n;
            std[i][1] += (p.y - mean[i][1]).powi(2) / n;
            std[i][2] += (p.z - mean[i][2]).powi(2) / n;
        }
    }
    for row in std.iter_mut() {
        for v in row.iter_mut() {
            *v = v.sqrt();
        }
    }

    let kept: Vec<Vec<Landmark>> = sets
        .iter()
        .filter(|set| {
            set.iter().enumerate().all(|(i, p)| {
                [p.x, p.y, p.z]
                    .iter()
                    .enumerate()
                    .all(|(c, v)| (v - mean[i][c]).abs() <= threshold * std[i][c])
            })
        })
        .cloned()
        .collect();

    if kept.is_empty() {
        sets.to_vec()
    } else {
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pose(offset: f64) -> Vec<Landmark> {
        (0..LANDMARK_COUNT)
            .map(|i| Landmark::new(0.3 + offset + i as f64 * 0.01, 0.5 + offset, 0.0))
            .collect()
    }

    #[test]
    fn test_normalize_to_wrist() {
        let normalized = normalize_to_wrist(&pose(0.1));
        assert_eq!(normalized[0], Landmark::new(0.0, 0.0, 0.0));
        assert!((normalized[20].x - 0.2).abs() < 1e-12);
        assert!(normalize_to_wrist(&[]).is_empty());
    }

    #[test]
    fn test_augment_preserves_depth_and_count() {
        let mut rng = StdRng::seed_from_u64(7);
        let src = pose(0.0);
        let out = augment(&src, &AugmentationConfig::default(), &mut rng);
        assert_eq!(out.len(), src.len());
        for (a, b) in src.iter().zip(&out) {
            assert_eq!(a.z, b.z);
        }
    }

    #[test]
    fn test_augment_zero_range_is_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        let config = AugmentationConfig {
            rotation_range: 0.0,
            translation_range: 0.0,
        };
        let src = pose(0.0);
        assert_eq!(augment(&src, &config, &mut rng), src);
    }

    #[test]
    fn test_filter_outliers_drops_far_pose() {
        let mut sets: Vec<Vec<Landmark>> = (0..9).map(|i| pose(i as f64 * 0.001)).collect();
        sets.push(pose(0.5));
        let filtered = filter_outliers(&sets, 2.0);
        assert_eq!(filtered.len(), 9);
        assert!(filtered.iter().all(|s| s[0].x < 0.5));
    }

    #[test]
    fn test_filter_outliers_small_input_unchanged() {
        let sets = vec![pose(0.0), pose(1.0)];
        assert_eq!(filter_outliers(&sets, 2.0), sets);
    }
}
