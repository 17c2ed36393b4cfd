//! Match decisions, learner feedback and detection quality tiers.

use serde::{Deserialize, Serialize};

use sign_core::{
    hand_span, DetectionQuality, Landmark, LANDMARK_COUNT, NO_CLEAR_GESTURE, POSE_NOT_DETECTED,
};

/// Thresholds for judging a practice attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Minimum confidence for a correct prediction to count as a match
    pub match_threshold: f64,
    /// Below this a miss is reported as "not clearly detected"
    pub unclear_threshold: f64,
    /// Planar hand span outside this range is poor framing
    pub span_range: (f64, f64),
    pub excellent_confidence: f64,
    pub good_confidence: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.75,
            unclear_threshold: 0.3,
            span_range: (0.05, 0.4),
            excellent_confidence: 0.8,
            good_confidence: 0.6,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FeedbackPolicy {
    config: FeedbackConfig,
}

impl FeedbackPolicy {
    pub fn new(config: FeedbackConfig) -> Self {
        Self { config }
    }

    pub fn is_match(&self, prediction: &str, target: &str, confidence: f64) -> bool {
        prediction == target && confidence >= self.config.match_threshold
    }

    pub fn feedback(
        &self,
        prediction: &str,
        target: &str,
        confidence: f64,
        is_match: bool,
    ) -> String {
        if is_match {
            let text = if confidence >= 0.95 {
                "Perfect! Sign executed flawlessly"
            } else if confidence >= 0.85 {
                "Excellent! Very good execution of the sign"
            } else if confidence >= 0.75 {
                "Very good! Correct sign, keep practicing"
            } else {
                "Correct! You can still improve your precision"
            };
            return text.to_string();
        }

        if confidence < self.config.unclear_threshold {
            "Sign not clearly detected. Make sure your hand is fully visible".to_string()
        } else if prediction == NO_CLEAR_GESTURE || prediction == POSE_NOT_DETECTED {
            "Keep your hand steady inside the camera frame".to_string()
        } else {
            format!(
                "Detected '{}'. Try performing the sign '{}' more clearly",
                prediction, target
            )
        }
    }

    /// Framing and confidence tier for one attempt.
    pub fn detection_quality(&self, landmarks: &[Landmark], confidence: f64) -> DetectionQuality {
        if landmarks.len() != LANDMARK_COUNT {
            return DetectionQuality::Poor;
        }
        let (min_span, max_span) = self.config.span_range;
        match hand_span(landmarks) {
            Some(span) if span >= min_span && span <= max_span => {}
            _ => return DetectionQuality::Poor,
        }

        if confidence >= self.config.excellent_confidence {
            DetectionQuality::Excellent
        } else if confidence >= self.config.good_confidence {
            DetectionQuality::Good
        } else {
            DetectionQuality::Fair
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand_with_span(span: f64) -> Vec<Landmark> {
        let mut points = vec![Landmark::new(0.5, 0.5, 0.0); 21];
        points[12] = Landmark::new(0.5, 0.5 - span, 0.3);
        points
    }

    #[test]
    fn test_match_requires_label_and_confidence() {
        let policy = FeedbackPolicy::default();
        assert!(policy.is_match("hello", "hello", 0.75));
        assert!(!policy.is_match("hello", "hello", 0.74));
        assert!(!policy.is_match("bye", "hello", 0.99));
    }

    #[test]
    fn test_feedback_bands() {
        let policy = FeedbackPolicy::default();
        assert!(policy.feedback("a", "a", 0.97, true).starts_with("Perfect"));
        assert!(policy.feedback("a", "a", 0.9, true).starts_with("Excellent"));
        assert!(policy.feedback("a", "a", 0.8, true).starts_with("Very good"));
        assert!(policy.feedback("a", "a", 0.5, true).starts_with("Correct"));
    }

    #[test]
    fn test_feedback_for_misses() {
        let policy = FeedbackPolicy::default();
        assert!(policy
            .feedback("b", "a", 0.1, false)
            .contains("not clearly detected"));
        assert!(policy
            .feedback(NO_CLEAR_GESTURE, "a", 0.45, false)
            .contains("steady"));
        assert_eq!(
            policy.feedback("b", "a", 0.6, false),
            "Detected 'b'. Try performing the sign 'a' more clearly"
        );
    }

    #[test]
    fn test_detection_quality_tiers() {
        let policy = FeedbackPolicy::default();
        let framed = hand_with_span(0.2);
        assert_eq!(policy.detection_quality(&framed, 0.9), DetectionQuality::Excellent);
        assert_eq!(policy.detection_quality(&framed, 0.7), DetectionQuality::Good);
        assert_eq!(policy.detection_quality(&framed, 0.2), DetectionQuality::Fair);

        assert_eq!(
            policy.detection_quality(&hand_with_span(0.01), 0.99),
            DetectionQuality::Poor
        );
        assert_eq!(
            policy.detection_quality(&hand_with_span(0.5), 0.99),
            DetectionQuality::Poor
        );
        assert_eq!(
            policy.detection_quality(&framed[..20], 0.99),
            DetectionQuality::Poor
        );
    }
}
