use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Success,
    Failure,
}

/// Outcome of one call within a batch. `payload` is set iff Success,
/// `error_message` iff Failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub index: usize,
    pub status: GenerationStatus,
    pub payload: Option<String>,
    pub error_message: Option<String>,
}

impl GenerationResult {
    pub fn success(index: usize, payload: String) -> Self {
        Self {
            index,
            status: GenerationStatus::Success,
            payload: Some(payload),
            error_message: None,
        }
    }

    pub fn failure(index: usize, error_message: String) -> Self {
        Self {
            index,
            status: GenerationStatus::Failure,
            payload: None,
            error_message: Some(error_message),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == GenerationStatus::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchPhase {
    Idle,
    Running,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchState {
    pub batch_id: String,
    pub total: usize,
    pub completed: usize,
    pub results: BTreeMap<usize, GenerationResult>,
    pub in_progress: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for BatchState {
    fn default() -> Self {
        Self {
            batch_id: String::new(),
            total: 0,
            completed: 0,
            results: BTreeMap::new(),
            in_progress: false,
            started_at: None,
            finished_at: None,
        }
    }
}

impl BatchState {
    pub fn begin(batch_id: String, total: usize) -> Self {
        Self {
            batch_id,
            total,
            completed: 0,
            results: BTreeMap::new(),
            in_progress: true,
            started_at: Some(Utc::now()),
            finished_at: None,
        }
    }

    /// Records one resolution. Returns false if `index` already resolved
    /// or is out of range, leaving the state untouched.
    pub fn record(&mut self, result: GenerationResult) -> bool {
        if !self.in_progress || result.index >= self.total || self.results.contains_key(&result.index) {
            return false;
        }
        self.results.insert(result.index, result);
        self.completed += 1;
        if self.completed == self.total {
            self.in_progress = false;
            self.finished_at = Some(Utc::now());
        }
        true
    }

    pub fn is_resolved(&self, index: usize) -> bool {
        self.results.contains_key(&index)
    }

    pub fn progress(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f32 / self.total as f32
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_counts_each_index_once() {
        let mut state = BatchState::begin("b1".into(), 2);
        assert!(state.record(GenerationResult::success(0, "aaa".into())));
        assert!(!state.record(GenerationResult::failure(0, "again".into())));
        assert!(!state.record(GenerationResult::failure(7, "out of range".into())));
        assert_eq!(state.completed, 1);
        assert!(state.in_progress);
        assert_eq!(state.progress(), 0.5);

        assert!(state.record(GenerationResult::failure(1, "boom".into())));
        assert_eq!(state.completed, 2);
        assert!(!state.in_progress);
        assert!(state.finished_at.is_some());
        assert_eq!((state.succeeded(), state.failed()), (1, 1));

        // nothing lands once the batch has drained
        assert!(!state.record(GenerationResult::success(1, "late".into())));
    }

    #[test]
    fn result_fields_match_status() {
        let ok = GenerationResult::success(3, "payload".into());
        assert!(ok.is_success());
        assert!(ok.payload.is_some() && ok.error_message.is_none());

        let err = GenerationResult::failure(4, "nope".into());
        assert_eq!(err.status, GenerationStatus::Failure);
        assert!(err.payload.is_none() && err.error_message.is_some());
    }
}
