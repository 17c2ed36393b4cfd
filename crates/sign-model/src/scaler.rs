//! Feature-wise standardization.

use serde::{Deserialize, Serialize};

/// Per-feature mean and scale fitted on a training matrix.
///
/// Scale is the population standard deviation; constant features get a
/// scale of 1 so they map to 0 instead of dividing by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
}

impl StandardScaler {
    /// Identity transform of the given width.
    pub fn identity(dim: usize) -> Self {
        Self {
            mean: vec![0.0; dim],
            scale: vec![1.0; dim],
        }
    }

    /// Fit on rows of equal width. Returns `None` for an empty matrix.
    pub fn fit(rows: &[Vec<f32>]) -> Option<Self> {
        let dim = rows.first()?.len();
        let n = rows.len() as f64;

        let mut mean = vec![0.0f64; dim];
        for row in rows {
            for (m, &v) in mean.iter_mut().zip(row) {
                *m += v as f64;
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut var = vec![0.0f64; dim];
        for row in rows {
            for ((s, &v), &m) in var.iter_mut().zip(row).zip(&mean) {
                *s += (v as f64 - m).powi(2);
            }
        }

        let scale = var
            .iter()
            .map(|&s| {
                let std = (s / n).sqrt();
                if std < 1e-12 {
                    1.0
                } else {
                    std as f32
                }
            })
            .collect();

        Some(Self {
            mean: mean.into_iter().map(|m| m as f32).collect(),
            scale,
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn is_compatible(&self, width: usize) -> bool {
        self.mean.len() == width && self.scale.len() == width
    }

    pub fn transform(&self, row: &[f32]) -> Vec<f32> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&v, (&m, &s))| (v - m) / s)
            .collect()
    }

    /// Standardize when widths agree, otherwise pass the row through.
    pub fn transform_or_raw(&self, row: &[f32]) -> Vec<f32> {
        if self.is_compatible(row.len()) {
            self.transform(row)
        } else {
            tracing::warn!(
                expected = self.dim(),
                actual = row.len(),
                "Scaler width mismatch, using raw features"
            );
            row.to_vec()
        }
    }

    pub fn transform_all(&self, rows: &[Vec<f32>]) -> Vec<Vec<f32>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_and_transform() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();

        assert_eq!(scaler.mean, vec![2.0, 5.0]);
        assert_eq!(scaler.scale, vec![1.0, 1.0]);
        assert_eq!(scaler.transform(&[3.0, 5.0]), vec![1.0, 0.0]);
    }

    #[test]
    fn test_transformed_columns_are_standardized() {
        let rows: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32 * 2.0 + 1.0]).collect();
        let scaler = StandardScaler::fit(&rows).unwrap();
        let out = scaler.transform_all(&rows);

        let mean: f32 = out.iter().map(|r| r[0]).sum::<f32>() / 10.0;
        let var: f32 = out.iter().map(|r| (r[0] - mean).powi(2)).sum::<f32>() / 10.0;
        assert!(mean.abs() < 1e-5);
        assert!((var - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_mismatched_width_falls_back_to_raw() {
        let scaler = StandardScaler::identity(3);
        assert_eq!(scaler.transform_or_raw(&[7.0, 8.0]), vec![7.0, 8.0]);
        assert!(StandardScaler::fit(&[]).is_none());
    }
}
