//! Pre-training sample validation report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sign_core::{HandLandmarks, StoredSample};

pub const NO_LANDMARKS: &str = "No landmarks detected";
pub const INVALID_LANDMARKS: &str = "Invalid landmarks format";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleIssue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub total_samples: usize,
    pub valid_samples: usize,
    pub invalid_samples: usize,
    pub errors: Vec<SampleIssue>,
    /// Valid samples per label
    pub label_distribution: BTreeMap<String, usize>,
    pub warnings: Vec<SampleIssue>,
}

impl ValidationReport {
    /// At least one valid sample and no invalid ones.
    pub fn is_valid(&self) -> bool {
        self.valid_samples > 0 && self.invalid_samples == 0
    }

    /// Labels that fell below the per-label minimum.
    pub fn underfilled_labels(&self) -> Vec<&str> {
        self.warnings
            .iter()
            .filter_map(|w| w.label.as_deref())
            .collect()
    }
}

fn is_empty_landmarks(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Report on stored samples. Never fails; the report only informs.
pub fn validate_samples(
    samples: &[StoredSample],
    min_samples_per_label: usize,
) -> ValidationReport {
    let mut report = ValidationReport {
        total_samples: samples.len(),
        ..Default::default()
    };

    for sample in samples {
        let issue = if is_empty_landmarks(&sample.landmarks) {
            Some(NO_LANDMARKS)
        } else {
            match sample.parsed_landmarks().and_then(HandLandmarks::new_finite) {
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!("Sample {} rejected: {}", sample.id, e);
                    Some(INVALID_LANDMARKS)
                }
            }
        };

        match issue {
            Some(error) => {
                report.invalid_samples += 1;
                report.errors.push(SampleIssue {
                    sample_id: Some(sample.id.clone()),
                    label: Some(sample.label.clone()),
                    error: error.to_string(),
                });
            }
            None => {
                report.valid_samples += 1;
                *report
                    .label_distribution
                    .entry(sample.label.clone())
                    .or_insert(0) += 1;
            }
        }
    }

    for (label, &count) in &report.label_distribution {
        if count < min_samples_per_label {
            report.warnings.push(SampleIssue {
                sample_id: None,
                label: Some(label.clone()),
                error: format!(
                    "Insufficient samples: {} (minimum: {})",
                    count, min_samples_per_label
                ),
            });
        }
    }

    tracing::info!(
        "Validated {} samples: {} valid, {} invalid, {} labels",
        report.total_samples,
        report.valid_samples,
        report.invalid_samples,
        report.label_distribution.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sign_core::Landmark;

    fn pose() -> Vec<Landmark> {
        (0..21)
            .map(|i| Landmark::new(0.3 + i as f64 * 0.01, 0.6, 0.0))
            .collect()
    }

    fn raw(label: &str, landmarks: serde_json::Value) -> StoredSample {
        let mut sample = StoredSample::from_landmarks(label, &[]);
        sample.landmarks = landmarks;
        sample
    }

    #[test]
    fn test_counts_and_errors() {
        let samples = vec![
            StoredSample::from_landmarks("a", &pose()),
            StoredSample::from_landmarks("a", &pose()),
            StoredSample::from_landmarks("b", &pose()),
            raw("b", json!([])),
            raw("b", json!(null)),
            raw("c", json!([{"x": 0.1, "y": 0.2}])),
            StoredSample::from_landmarks("c", &pose()[..20]),
        ];

        let report = validate_samples(&samples, 2);
        assert_eq!(report.total_samples, 7);
        assert_eq!(report.valid_samples, 3);
        assert_eq!(report.invalid_samples, 4);
        assert!(!report.is_valid());

        let messages: Vec<&str> = report.errors.iter().map(|e| e.error.as_str()).collect();
        assert_eq!(
            messages,
            vec![NO_LANDMARKS, NO_LANDMARKS, INVALID_LANDMARKS, INVALID_LANDMARKS]
        );
        assert_eq!(report.label_distribution.get("a"), Some(&2));
        assert_eq!(report.label_distribution.get("c"), None);
    }

    #[test]
    fn test_insufficient_label_warning() {
        let mut samples: Vec<StoredSample> = (0..10)
            .map(|_| StoredSample::from_landmarks("a", &pose()))
            .collect();
        samples.push(StoredSample::from_landmarks("b", &pose()));

        let report = validate_samples(&samples, 10);
        assert!(report.is_valid());
        assert_eq!(report.underfilled_labels(), vec!["b"]);
        assert_eq!(report.warnings[0].error, "Insufficient samples: 1 (minimum: 10)");
    }

    #[test]
    fn test_non_finite_coordinates_are_invalid() {
        let mut points = pose();
        points[3].x = f64::NAN;
        let report = validate_samples(&[StoredSample::from_landmarks("a", &points)], 1);
        // NaN serializes as null, which no longer parses as a coordinate
        assert_eq!(report.invalid_samples, 1);
        assert_eq!(report.errors[0].error, INVALID_LANDMARKS);
    }

    #[test]
    fn test_empty_input() {
        let report = validate_samples(&[], 10);
        assert_eq!(report.total_samples, 0);
        assert!(!report.is_valid());
        assert!(report.warnings.is_empty());
    }
}
