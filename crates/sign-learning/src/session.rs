//! Running practice statistics per model and learner.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use sign_core::ModelId;

/// Practice statistics are kept per model and optional learner session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub model_id: ModelId,
    pub session: Option<String>,
}

impl SessionKey {
    pub fn new(model_id: ModelId, session: Option<&str>) -> Self {
        Self {
            model_id,
            session: session.map(str::to_string),
        }
    }

    pub fn model(model_id: ModelId) -> Self {
        Self {
            model_id,
            session: None,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.session {
            Some(session) => write!(f, "{}_{}", self.model_id, session),
            None => write!(f, "{}", self.model_id),
        }
    }
}

/// One practice attempt reported by the client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressUpdate {
    pub target_label: Option<String>,
    pub is_correct: bool,
    pub confidence: f64,
    pub similarity: f64,
    /// Seconds spent on this attempt
    pub session_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelProgress {
    pub attempts: u64,
    pub successes: u64,
    pub average_confidence: f64,
}

#[derive(Debug, Clone, Default)]
struct SessionRecord {
    total_attempts: u64,
    correct_attempts: u64,
    total_confidence: f64,
    total_similarity: f64,
    current_streak: u64,
    best_streak: u64,
    time_spent: f64,
    last_activity: Option<DateTime<Utc>>,
    labels: BTreeMap<String, LabelProgress>,
}

impl SessionRecord {
    fn apply(&mut self, update: &ProgressUpdate) {
        if update.is_correct {
            self.correct_attempts += 1;
            self.current_streak += 1;
            self.best_streak = self.best_streak.max(self.current_streak);
        } else {
            self.current_streak = 0;
        }

        self.total_attempts += 1;
        self.total_confidence += update.confidence;
        self.total_similarity += update.similarity;
        self.time_spent += update.session_time;
        self.last_activity = Some(Utc::now());

        if let Some(label) = update.target_label.as_deref().filter(|l| !l.is_empty()) {
            let progress = self.labels.entry(label.to_string()).or_default();
            progress.attempts += 1;
            if update.is_correct {
                progress.successes += 1;
            }
            let n = progress.attempts as f64;
            progress.average_confidence =
                (progress.average_confidence * (n - 1.0) + update.confidence) / n;
        }
    }

    fn stats(&self) -> SessionStats {
        let attempts = self.total_attempts.max(1) as f64;
        SessionStats {
            total_attempts: self.total_attempts,
            correct_attempts: self.correct_attempts,
            average_confidence: self.total_confidence / attempts,
            average_similarity: self.total_similarity / attempts,
            success_rate: self.correct_attempts as f64 / attempts * 100.0,
            current_streak: self.current_streak,
            best_streak: self.best_streak,
            time_spent: self.time_spent,
            last_activity: self.last_activity,
        }
    }
}

/// Aggregate view of one session. All zeros when nothing was recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_attempts: u64,
    pub correct_attempts: u64,
    pub average_confidence: f64,
    pub average_similarity: f64,
    /// Percentage in [0, 100]
    pub success_rate: f64,
    pub current_streak: u64,
    pub best_streak: u64,
    pub time_spent: f64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    VeryHard,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelPerformance {
    pub label: String,
    pub attempts: u64,
    pub successes: u64,
    pub success_rate: f64,
    pub average_confidence: f64,
    pub difficulty: Difficulty,
    pub recommendations: Vec<String>,
}

impl LabelPerformance {
    fn unknown(label: &str) -> Self {
        Self {
            label: label.to_string(),
            attempts: 0,
            successes: 0,
            success_rate: 0.0,
            average_confidence: 0.0,
            difficulty: Difficulty::Unknown,
            recommendations: Vec::new(),
        }
    }
}

/// Classify a label from its success rate (percent) and mean confidence.
pub fn assess_difficulty(success_rate: f64, average_confidence: f64) -> Difficulty {
    if success_rate >= 80.0 && average_confidence >= 0.8 {
        Difficulty::Easy
    } else if success_rate >= 60.0 && average_confidence >= 0.6 {
        Difficulty::Medium
    } else if success_rate >= 40.0 {
        Difficulty::Hard
    } else {
        Difficulty::VeryHard
    }
}

pub fn recommendations(success_rate: f64, average_confidence: f64, label: &str) -> Vec<String> {
    let mut out = Vec::new();

    if success_rate < 50.0 {
        out.push(format!(
            "Practice the sign '{}' more, studying the reference image carefully",
            label
        ));
        out.push("Try slower, more deliberate movements".to_string());
    }

    if average_confidence < 0.6 {
        out.push("Improve the lighting and make sure your whole hand is visible".to_string());
        out.push("Hold your hand steady for a few seconds while signing".to_string());
    }

    if success_rate < 70.0 && average_confidence >= 0.7 {
        out.push("Detection is good, but the hand shape needs to be more precise".to_string());
    }

    if out.is_empty() {
        out.push("Excellent progress! Keep practicing to maintain your level".to_string());
    }
    out
}

/// Registry of practice statistics.
///
/// Every update holds the write lock for the whole read-modify-write so
/// concurrent attempts on one session never lose counts.
pub struct SessionStatsAggregator {
    sessions: RwLock<HashMap<SessionKey, SessionRecord>>,
}

impl SessionStatsAggregator {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Record one attempt and return the updated statistics.
    pub async fn update_progress(&self, key: &SessionKey, update: &ProgressUpdate) -> SessionStats {
        let mut sessions = self.sessions.write().await;
        let record = sessions.entry(key.clone()).or_default();
        record.apply(update);
        record.stats()
    }

    pub async fn session_stats(&self, key: &SessionKey) -> SessionStats {
        let sessions = self.sessions.read().await;
        sessions.get(key).map(SessionRecord::stats).unwrap_or_default()
    }

    pub async fn label_performance(&self, key: &SessionKey, label: &str) -> LabelPerformance {
        let sessions = self.sessions.read().await;
        let Some(progress) = sessions.get(key).and_then(|r| r.labels.get(label)) else {
            return LabelPerformance::unknown(label);
        };

        let success_rate = progress.successes as f64 / progress.attempts.max(1) as f64 * 100.0;
        LabelPerformance {
            label: label.to_string(),
            attempts: progress.attempts,
            successes: progress.successes,
            success_rate,
            average_confidence: progress.average_confidence,
            difficulty: assess_difficulty(success_rate, progress.average_confidence),
            recommendations: recommendations(success_rate, progress.average_confidence, label),
        }
    }

    /// Per-label progress of one session, keyed by label.
    pub async fn label_progress(&self, key: &SessionKey) -> BTreeMap<String, LabelProgress> {
        let sessions = self.sessions.read().await;
        sessions.get(key).map(|r| r.labels.clone()).unwrap_or_default()
    }

    /// Delete one session. Returns whether it existed.
    pub async fn reset(&self, key: &SessionKey) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(key).is_some()
    }

    /// Delete every session of a model.
    pub async fn reset_model(&self, model_id: &ModelId) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|k, _| &k.model_id != model_id);
        before - sessions.len()
    }

    pub async fn clear(&self) {
        let mut sessions = self.sessions.write().await;
        sessions.clear();
    }

    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }
}

impl Default for SessionStatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(session: &str) -> SessionKey {
        SessionKey::new(ModelId::new("m"), Some(session))
    }

    fn attempt(label: &str, correct: bool, confidence: f64) -> ProgressUpdate {
        ProgressUpdate {
            target_label: Some(label.to_string()),
            is_correct: correct,
            confidence,
            similarity: 0.5,
            session_time: 2.0,
        }
    }

    #[tokio::test]
    async fn test_streaks() {
        let agg = SessionStatsAggregator::new();
        let k = key("u1");
        for _ in 0..4 {
            agg.update_progress(&k, &attempt("a", true, 0.9)).await;
        }
        let stats = agg.update_progress(&k, &attempt("a", false, 0.2)).await;

        assert_eq!(stats.current_streak, 0);
        assert_eq!(stats.best_streak, 4);
        assert_eq!(stats.total_attempts, 5);
        assert_eq!(stats.correct_attempts, 4);
        assert!((stats.success_rate - 80.0).abs() < 1e-9);
        assert!((stats.average_confidence - 0.76).abs() < 1e-9);
        assert_eq!(stats.time_spent, 10.0);
        assert!(stats.last_activity.is_some());
    }

    #[tokio::test]
    async fn test_empty_session_is_zeroed() {
        let agg = SessionStatsAggregator::new();
        let stats = agg.session_stats(&key("nobody")).await;
        assert_eq!(stats, SessionStats::default());

        let perf = agg.label_performance(&key("nobody"), "a").await;
        assert_eq!(perf.difficulty, Difficulty::Unknown);
        assert!(perf.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_label_running_average_and_difficulty() {
        let agg = SessionStatsAggregator::new();
        let k = key("u1");
        agg.update_progress(&k, &attempt("a", true, 0.9)).await;
        agg.update_progress(&k, &attempt("a", true, 0.8)).await;
        agg.update_progress(&k, &attempt("b", false, 0.4)).await;

        let a = agg.label_performance(&k, "a").await;
        assert_eq!(a.attempts, 2);
        assert!((a.average_confidence - 0.85).abs() < 1e-9);
        assert_eq!(a.difficulty, Difficulty::Easy);
        assert_eq!(a.recommendations.len(), 1);
        assert!(a.recommendations[0].starts_with("Excellent progress"));

        let b = agg.label_performance(&k, "b").await;
        assert_eq!(b.difficulty, Difficulty::VeryHard);
        // low success plus low confidence
        assert_eq!(b.recommendations.len(), 4);
    }

    #[test]
    fn test_difficulty_table() {
        assert_eq!(assess_difficulty(80.0, 0.8), Difficulty::Easy);
        assert_eq!(assess_difficulty(90.0, 0.7), Difficulty::Medium);
        assert_eq!(assess_difficulty(60.0, 0.5), Difficulty::Hard);
        assert_eq!(assess_difficulty(39.9, 0.99), Difficulty::VeryHard);
        assert_eq!(
            serde_json::to_value(Difficulty::VeryHard).unwrap(),
            serde_json::json!("very_hard")
        );
    }

    #[test]
    fn test_precision_recommendation() {
        let recs = recommendations(65.0, 0.75, "a");
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("precise"));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let agg = Arc::new(SessionStatsAggregator::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let agg = agg.clone();
            handles.push(tokio::spawn(async move {
                agg.update_progress(&key("u1"), &attempt("a", true, 1.0)).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let stats = agg.session_stats(&key("u1")).await;
        assert_eq!(stats.total_attempts, 50);
        assert_eq!(stats.best_streak, 50);
    }

    #[tokio::test]
    async fn test_reset_is_scoped() {
        let agg = SessionStatsAggregator::new();
        agg.update_progress(&key("u1"), &attempt("a", true, 0.9)).await;
        agg.update_progress(&key("u2"), &attempt("a", true, 0.9)).await;

        assert!(agg.reset(&key("u1")).await);
        assert!(!agg.reset(&key("u1")).await);
        assert_eq!(agg.session_stats(&key("u2")).await.total_attempts, 1);
        assert_eq!(agg.reset_model(&ModelId::new("m")).await, 1);
        assert_eq!(agg.session_count().await, 0);
    }
}
