//! Representative sample selection per label.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sign_core::{parse_landmarks, planar_fingertip_distances, StoredSample, LANDMARK_COUNT};

/// Reference pose shown to a learner for one label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceSample {
    pub label: String,
    pub reference_image: Option<String>,
    pub total_samples: usize,
    pub landmarks: serde_json::Value,
    pub created: Option<DateTime<Utc>>,
}

/// Scoring weights for reference quality
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub complete_bonus: f64,
    pub fingertip_bonus: f64,
    /// Planar wrist-to-tip distance band earning the fingertip bonus
    pub fingertip_band: (f64, f64),
    pub parse_penalty: f64,
    pub timestamp_bonus: f64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            complete_bonus: 50.0,
            fingertip_bonus: 10.0,
            fingertip_band: (0.1, 0.4),
            parse_penalty: 20.0,
            timestamp_bonus: 5.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceSelector {
    config: ReferenceConfig,
}

impl ReferenceSelector {
    pub fn new(config: ReferenceConfig) -> Self {
        Self { config }
    }

    /// Heuristic quality of one stored sample. Higher is better.
    pub fn quality_score(&self, sample: &StoredSample) -> f64 {
        let c = &self.config;
        let mut score = 0.0;

        if has_landmarks(&sample.landmarks) {
            match parse_landmarks(&sample.landmarks) {
                Ok(points) if points.len() == LANDMARK_COUNT => {
                    score += c.complete_bonus;
                    if let Some(distances) = planar_fingertip_distances(&points) {
                        let (lo, hi) = c.fingertip_band;
                        let in_band = distances.iter().filter(|&&d| d > lo && d < hi).count();
                        score += in_band as f64 * c.fingertip_bonus;
                    }
                }
                Ok(_) => {}
                Err(_) => score -= c.parse_penalty,
            }
        }

        if sample.created_at.is_some() {
            score += c.timestamp_bonus;
        }
        score
    }

    /// Highest-scoring sample; the earliest wins ties. A lone sample is
    /// returned without scoring.
    pub fn select_best<'a>(&self, samples: &'a [StoredSample]) -> Option<&'a StoredSample> {
        if samples.len() == 1 {
            return samples.first();
        }

        let mut best: Option<(&StoredSample, f64)> = None;
        for sample in samples {
            let score = self.quality_score(sample);
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((sample, score)),
            }
        }
        best.map(|(s, _)| s)
    }

    /// One reference per label, sorted by label.
    pub fn references(&self, samples: &[StoredSample]) -> Vec<ReferenceSample> {
        let mut by_label: BTreeMap<&str, Vec<StoredSample>> = BTreeMap::new();
        for sample in samples {
            by_label
                .entry(sample.label.as_str())
                .or_default()
                .push(sample.clone());
        }

        by_label
            .into_iter()
            .filter_map(|(label, group)| {
                let best = self.select_best(&group)?;
                Some(ReferenceSample {
                    label: label.to_string(),
                    reference_image: best.image_data.clone(),
                    total_samples: group.len(),
                    landmarks: best.landmarks.clone(),
                    created: best.created_at,
                })
            })
            .collect()
    }
}

fn has_landmarks(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Array(items) => !items.is_empty(),
        serde_json::Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sign_core::Landmark;

    /// Hand whose fingertips sit `reach` away from the wrist in the image plane.
    fn hand(reach: f64) -> Vec<Landmark> {
        (0..21)
            .map(|i| {
                if [4, 8, 12, 16, 20].contains(&i) {
                    Landmark::new(0.5, 0.5 - reach, 0.0)
                } else {
                    Landmark::new(0.5, 0.5 - i as f64 * 0.001, 0.0)
                }
            })
            .collect()
    }

    fn sample(label: &str, points: &[Landmark], image: &str) -> StoredSample {
        let mut s = StoredSample::from_landmarks(label, points);
        s.image_data = Some(image.to_string());
        s.created_at = None;
        s
    }

    #[test]
    fn test_quality_score_components() {
        let selector = ReferenceSelector::default();

        let good = sample("a", &hand(0.2), "img");
        assert_eq!(selector.quality_score(&good), 100.0);

        let far = sample("a", &hand(0.6), "img");
        assert_eq!(selector.quality_score(&far), 50.0);

        let mut broken = sample("a", &hand(0.2), "img");
        broken.landmarks = serde_json::json!([{"x": "?"}]);
        broken.created_at = Some(Utc::now());
        assert_eq!(selector.quality_score(&broken), -15.0);

        let short = sample("a", &hand(0.2)[..10], "img");
        assert_eq!(selector.quality_score(&short), 0.0);
    }

    #[test]
    fn test_best_reference_per_label_sorted() {
        let selector = ReferenceSelector::default();
        let samples = vec![
            sample("zeta", &hand(0.6), "z1"),
            sample("alpha", &hand(0.6), "a1"),
            sample("alpha", &hand(0.2), "a2"),
            sample("alpha", &hand(0.2), "a3"),
        ];

        let refs = selector.references(&samples);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].label, "alpha");
        assert_eq!(refs[0].total_samples, 3);
        // ties resolve to the first encountered
        assert_eq!(refs[0].reference_image.as_deref(), Some("a2"));
        assert_eq!(refs[1].label, "zeta");
        assert_eq!(refs[1].reference_image.as_deref(), Some("z1"));
    }

    #[test]
    fn test_single_sample_returned_as_is() {
        let selector = ReferenceSelector::default();
        let mut lone = sample("a", &hand(0.2), "only");
        lone.landmarks = serde_json::Value::Null;
        let picked = selector.select_best(std::slice::from_ref(&lone)).unwrap();
        assert_eq!(picked.image_data.as_deref(), Some("only"));
        assert!(selector.select_best(&[]).is_none());
    }
}
