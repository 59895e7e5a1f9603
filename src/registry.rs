use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::io_struct::PipelineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Processing,
    Completed,
    Error,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Error)
    }
}

/// State of one run, owned by its registry entry. Mutated only by the run
/// that created it; status pollers get snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Most recent stage milestone, for observability while polling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_milestone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<PipelineResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Process-wide table of in-flight and finished runs, keyed by request id.
/// Entries are never evicted; they persist for the process lifetime.
#[derive(Default)]
pub struct RequestRegistry {
    entries: DashMap<String, RunState>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, request_id: &str, user_id: &str) {
        self.entries.insert(
            request_id.to_string(),
            RunState {
                status: RunStatus::Processing,
                user_id: user_id.to_string(),
                start_time: Utc::now(),
                end_time: None,
                last_milestone: None,
                result: None,
                error: None,
            },
        );
    }

    /// Records a stage milestone on a still-running entry. Observational
    /// only; terminal entries are left untouched.
    pub fn record_milestone(&self, request_id: &str, milestone: &str) {
        if let Some(mut entry) = self.entries.get_mut(request_id) {
            if !entry.status.is_terminal() {
                entry.last_milestone = Some(milestone.to_string());
            }
        }
    }

    /// Snapshot of the run state, or `None` for an unknown id.
    pub fn get(&self, request_id: &str) -> Option<RunState> {
        self.entries.get(request_id).map(|entry| entry.value().clone())
    }

    pub fn complete(&self, request_id: &str, result: PipelineResult) -> bool {
        self.finish(request_id, |state| {
            state.status = RunStatus::Completed;
            state.result = Some(result);
        })
    }

    pub fn fail(&self, request_id: &str, detail: String) -> bool {
        self.finish(request_id, |state| {
            state.status = RunStatus::Error;
            state.error = Some(detail);
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies the single allowed terminal transition. A second terminal call
    /// on the same key leaves the entry untouched and returns false.
    fn finish(&self, request_id: &str, apply: impl FnOnce(&mut RunState)) -> bool {
        let Some(mut entry) = self.entries.get_mut(request_id) else {
            log::warn!("[{request_id}] terminal transition for unknown request");
            return false;
        };
        if entry.status.is_terminal() {
            log::warn!(
                "[{request_id}] ignoring terminal transition: run already {:?}",
                entry.status
            );
            return false;
        }
        apply(&mut entry);
        entry.end_time = Some(Utc::now());
        true
    }
}
