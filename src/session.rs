//! Session state — process-wide facts policies read and update.
//!
//! Persisted as `{project_dir}/session_state.json`. Multiple policies touch
//! this record within one scheduling pass; all access goes through the
//! State Store (`storage::state_store`), which serializes it. Deleting the
//! file resets to defaults.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One recently-touched file, for rolling-window queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub timestamp: DateTime<Utc>,
}

/// Rolling cap on the recent-changes list. Entries past this drop oldest
/// first regardless of age.
const MAX_RECENT_CHANGES: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_start: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: u64,
    #[serde(default)]
    pub recent_file_changes: Vec<FileChange>,
    #[serde(default)]
    pub last_context_refresh: Option<DateTime<Utc>>,
}

impl Default for SessionState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            session_start: now,
            last_activity: now,
            message_count: 0,
            recent_file_changes: Vec::new(),
            last_context_refresh: None,
        }
    }
}

impl SessionState {
    /// Record a file touch. Oldest entries fall off past the cap.
    pub fn track_file_change(&mut self, path: &str) {
        self.last_activity = Utc::now();
        self.recent_file_changes.push(FileChange {
            path: path.to_string(),
            timestamp: Utc::now(),
        });
        if self.recent_file_changes.len() > MAX_RECENT_CHANGES {
            self.recent_file_changes.remove(0);
        }
    }

    pub fn increment_message_count(&mut self) {
        self.last_activity = Utc::now();
        self.message_count += 1;
    }

    pub fn touch_context_refresh(&mut self) {
        self.last_context_refresh = Some(Utc::now());
    }

    /// Changes within the trailing window, oldest first.
    pub fn recent_file_changes(&self, window_minutes: i64) -> Vec<FileChange> {
        let cutoff = Utc::now() - Duration::minutes(window_minutes);
        self.recent_file_changes
            .iter()
            .filter(|c| c.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Minutes since session start.
    pub fn duration_minutes(&self) -> i64 {
        (Utc::now() - self.session_start).num_minutes()
    }
}
