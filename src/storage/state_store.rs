//! State Store — serialized access to the session record.
//!
//! Policies run concurrently within a scheduling pass, and this is the only
//! resource they mutate in common: every operation is an atomic
//! read-modify-write under one mutex, and every mutation persists the whole
//! record. Corrupt or unreadable backing storage loads as a fresh default —
//! the store degrades, it never fails.

use std::path::PathBuf;
use std::sync::Mutex;

use crate::session::{FileChange, SessionState};
use crate::storage::path_utils;

pub struct StateStore {
    path: PathBuf,
    state: Mutex<SessionState>,
}

impl StateStore {
    /// Open the store for a project, loading `session_state.json` if present.
    pub fn open(project_dir: &std::path::Path) -> Self {
        let path = path_utils::session_state_path(project_dir);
        let state = Self::load_or_default(&path);
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    fn load_or_default(path: &std::path::Path) -> SessionState {
        if !path.exists() {
            return SessionState::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt session state — resetting");
                SessionState::default()
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable session state — resetting");
                SessionState::default()
            }
        }
    }

    /// Snapshot of the current state. Readers see either the pre- or
    /// post-update value of any concurrent mutation, never a partial one.
    pub fn read(&self) -> SessionState {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Replace the whole record and persist.
    pub fn write(&self, new_state: SessionState) {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        *guard = new_state;
        self.persist(&guard);
    }

    pub fn track_file_change(&self, path: &str) {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        guard.track_file_change(path);
        self.persist(&guard);
    }

    pub fn increment_message_count(&self) -> u64 {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        guard.increment_message_count();
        self.persist(&guard);
        guard.message_count
    }

    pub fn touch_context_refresh(&self) {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        guard.touch_context_refresh();
        self.persist(&guard);
    }

    pub fn recent_file_changes(&self, window_minutes: i64) -> Vec<FileChange> {
        self.state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .recent_file_changes(window_minutes)
    }

    /// Best-effort save under the lock. Failures are warnings — losing a
    /// session fact must never block the pipeline.
    fn persist(&self, state: &SessionState) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "Failed to create state dir");
                return;
            }
        }
        match serde_json::to_string_pretty(state) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    tracing::warn!(path = %self.path.display(), error = %e, "Failed to write session state");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize session state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_mutations_persist_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = StateStore::open(dir.path());
            store.increment_message_count();
            store.track_file_change("src/auth.rs");
        }
        let store = StateStore::open(dir.path());
        let state = store.read();
        assert_eq!(state.message_count, 1);
        assert_eq!(state.recent_file_changes.len(), 1);
    }

    #[test]
    fn test_corrupt_file_resets_to_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("session_state.json"), "]]garbage[[").unwrap();
        let store = StateStore::open(dir.path());
        assert_eq!(store.read().message_count, 0);
    }

    #[test]
    fn test_deleting_file_resets_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path());
        store.increment_message_count();
        drop(store);

        std::fs::remove_file(dir.path().join("session_state.json")).unwrap();
        let store = StateStore::open(dir.path());
        assert_eq!(store.read().message_count, 0);
    }

    #[test]
    fn test_concurrent_increments_serialize() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::open(dir.path()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    store.increment_message_count();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.read().message_count, 200);
    }
}
