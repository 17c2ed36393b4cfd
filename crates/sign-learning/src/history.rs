//! Bounded history of comparison results.

use std::collections::{HashMap, VecDeque};

use tokio::sync::RwLock;

use sign_core::{ComparisonResult, ModelId};

use crate::session::SessionKey;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Most recent comparisons per session and target label
pub struct ComparisonHistory {
    capacity: usize,
    entries: RwLock<HashMap<(SessionKey, String), VecDeque<ComparisonResult>>>,
}

impl ComparisonHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append, dropping the oldest entries beyond capacity.
    pub async fn record(&self, key: &SessionKey, label: &str, result: ComparisonResult) {
        let mut entries = self.entries.write().await;
        let queue = entries
            .entry((key.clone(), label.to_string()))
            .or_default();
        queue.push_back(result);
        while queue.len() > self.capacity {
            queue.pop_front();
        }
    }

    /// Oldest first.
    pub async fn recent(&self, key: &SessionKey, label: &str) -> Vec<ComparisonResult> {
        let entries = self.entries.read().await;
        entries
            .get(&(key.clone(), label.to_string()))
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove every label's history for one session.
    pub async fn reset(&self, key: &SessionKey) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(k, _), _| k != key);
        before - entries.len()
    }

    pub async fn reset_model(&self, model_id: &ModelId) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(k, _), _| &k.model_id != model_id);
        before - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl Default for ComparisonHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
