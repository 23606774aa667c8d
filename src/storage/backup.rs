//! Backup Manager — pre-mutation snapshots with retention pruning.
//!
//! Consulted only when a policy wants a safety net before an auto-fix.
//! Creation failures are logged and non-fatal: the fix proceeds without a
//! net rather than blocking the whole pipeline on a backup I/O error.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BackupConfig;

const INDEX_FILE: &str = "backups.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub original_path: String,
    pub backup_path: String,
    pub created_at: DateTime<Utc>,
}

pub struct BackupManager {
    enabled: bool,
    backup_dir: PathBuf,
    retention_days: i64,
    index: Mutex<Vec<BackupRecord>>,
}

impl BackupManager {
    /// Open the manager for a project and prune stale backups immediately.
    pub fn open(project_dir: &Path, config: &BackupConfig) -> Self {
        let backup_dir = config
            .directory
            .clone()
            .unwrap_or_else(|| crate::storage::path_utils::backups_dir(project_dir));
        let index = Self::load_index(&backup_dir);
        let manager = Self {
            enabled: config.enabled,
            backup_dir,
            retention_days: config.retention_days,
            index: Mutex::new(index),
        };
        manager.cleanup_old_backups();
        manager
    }

    fn load_index(backup_dir: &Path) -> Vec<BackupRecord> {
        let path = backup_dir.join(INDEX_FILE);
        if !path.exists() {
            return Vec::new();
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Corrupt backup index — starting empty");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }

    fn save_index(&self, records: &[BackupRecord]) {
        std::fs::create_dir_all(&self.backup_dir).ok();
        let path = self.backup_dir.join(INDEX_FILE);
        if let Ok(json) = serde_json::to_string_pretty(records) {
            if let Err(e) = std::fs::write(&path, json) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to write backup index");
            }
        }
    }

    /// Snapshot a file before mutation. Returns the backup path, or `None`
    /// when disabled or the file does not exist (nothing to protect).
    pub fn create_backup(&self, original: &Path) -> crate::GuardResult<Option<PathBuf>> {
        if !self.enabled {
            return Ok(None);
        }
        if !original.exists() {
            tracing::debug!(path = %original.display(), "No backup: file absent");
            return Ok(None);
        }

        std::fs::create_dir_all(&self.backup_dir)?;

        let basename = original
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed");
        // Timestamped name; two snapshots can land in the same millisecond,
        // so bump a disambiguator until the destination is free
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S%.3f").to_string();
        let mut dest = self.backup_dir.join(format!("{}.{}.bak", basename, timestamp));
        let mut attempt = 1u32;
        while dest.exists() {
            dest = self
                .backup_dir
                .join(format!("{}.{}-{}.bak", basename, timestamp, attempt));
            attempt += 1;
        }

        std::fs::copy(original, &dest)?;

        let record = BackupRecord {
            original_path: original.to_string_lossy().to_string(),
            backup_path: dest.to_string_lossy().to_string(),
            created_at: Utc::now(),
        };
        let mut index = self.index.lock().unwrap_or_else(|p| p.into_inner());
        index.push(record);
        self.save_index(&index);

        tracing::info!(original = %original.display(), backup = %dest.display(), "Backup created");
        Ok(Some(dest))
    }

    /// Restore a snapshot over the original. Returns false (with a log)
    /// instead of erroring — callers treat restore as best effort.
    pub fn restore_backup(&self, backup_path: &Path, original_path: &Path) -> bool {
        if !backup_path.exists() {
            tracing::warn!(path = %backup_path.display(), "Restore failed: backup absent");
            return false;
        }
        if let Some(parent) = original_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        match std::fs::copy(backup_path, original_path) {
            Ok(_) => {
                tracing::info!(backup = %backup_path.display(), original = %original_path.display(), "Backup restored");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Restore failed");
                false
            }
        }
    }

    /// Prune every backup older than the retention window, restored or not.
    /// Called at construction; the cleanup CLI may call it again.
    pub fn cleanup_old_backups(&self) {
        let cutoff = Utc::now() - Duration::days(self.retention_days);
        let mut index = self.index.lock().unwrap_or_else(|p| p.into_inner());

        let before = index.len();
        index.retain(|record| {
            if record.created_at >= cutoff {
                return true;
            }
            match std::fs::remove_file(&record.backup_path) {
                Ok(()) => tracing::info!(path = %record.backup_path, "Old backup deleted (retention)"),
                // Already gone is fine; anything else gets a warning but
                // the record is dropped either way
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %record.backup_path, error = %e, "Failed to delete old backup"),
            }
            false
        });

        if index.len() != before {
            self.save_index(&index);
        }
    }

    /// Current index, newest last.
    pub fn list_backups(&self) -> Vec<BackupRecord> {
        self.index.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(dir: &Path, retention_days: i64) -> BackupManager {
        BackupManager::open(
            dir,
            &BackupConfig {
                enabled: true,
                directory: Some(dir.join("backups")),
                retention_days,
            },
        )
    }

    #[test]
    fn test_create_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("config.toml");
        std::fs::write(&target, "original = true").unwrap();

        let mgr = manager(dir.path(), 7);
        let backup = mgr.create_backup(&target).unwrap().unwrap();
        std::fs::write(&target, "mutated = true").unwrap();

        assert!(mgr.restore_backup(&backup, &target));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "original = true");
    }

    #[test]
    fn test_absent_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 7);
        let result = mgr.create_backup(&dir.path().join("missing.rs")).unwrap();
        assert!(result.is_none());
        assert!(mgr.list_backups().is_empty());
    }

    #[test]
    fn test_disabled_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("file.rs");
        std::fs::write(&target, "x").unwrap();
        let mgr = BackupManager::open(
            dir.path(),
            &BackupConfig {
                enabled: false,
                directory: Some(dir.path().join("backups")),
                retention_days: 7,
            },
        );
        assert!(mgr.create_backup(&target).unwrap().is_none());
    }

    #[test]
    fn test_rapid_backups_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lib.rs");
        std::fs::write(&target, "x").unwrap();

        let mgr = manager(dir.path(), 7);
        // Back-to-back snapshots routinely share a millisecond timestamp;
        // each must still get its own file
        let first = mgr.create_backup(&target).unwrap().unwrap();
        let second = mgr.create_backup(&target).unwrap().unwrap();

        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
        assert_eq!(mgr.list_backups().len(), 2);
    }

    #[test]
    fn test_retention_prunes_old_keeps_young() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lib.rs");
        std::fs::write(&target, "x").unwrap();

        let mgr = manager(dir.path(), 7);
        let old = mgr.create_backup(&target).unwrap().unwrap();
        let young = mgr.create_backup(&target).unwrap().unwrap();

        // Backdate the first record past the retention window
        {
            let mut index = mgr.index.lock().unwrap();
            index[0].created_at = Utc::now() - Duration::days(10);
        }

        mgr.cleanup_old_backups();

        assert!(!old.exists());
        assert!(young.exists());
        assert_eq!(mgr.list_backups().len(), 1);
    }

    #[test]
    fn test_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("main.rs");
        std::fs::write(&target, "x").unwrap();
        {
            let mgr = manager(dir.path(), 7);
            mgr.create_backup(&target).unwrap();
        }
        let mgr = manager(dir.path(), 7);
        assert_eq!(mgr.list_backups().len(), 1);
    }
}
