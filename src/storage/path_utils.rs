//! Well-known local directory layout.
//!
//! Everything lives under `{data_dir}/ai-guardrail/projects/{project_hash}/`
//! and can be deleted at any time to reset to defaults. Nothing here is
//! meant for cross-machine sharing.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Truncated-hash length for project identifiers.
pub const PROJECT_HASH_LEN: usize = 12;

/// Centralized data directory, cross-platform.
/// Linux: ~/.config/ai-guardrail/
/// macOS: ~/Library/Application Support/ai-guardrail/
/// Windows: %APPDATA%/ai-guardrail/
/// `GUARDRAIL_DATA_DIR` overrides everything (used by tests and CI).
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("GUARDRAIL_DATA_DIR") {
        return PathBuf::from(dir);
    }
    let base = dirs::config_dir().unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
    });
    base.join("ai-guardrail")
}

pub fn projects_dir() -> PathBuf {
    data_dir().join("projects")
}

/// Per-project root: `{data_dir}/projects/{hash}/`. Holds guardrail.json,
/// session_state.json, verdict_cache.json, analytics.db, backups/,
/// guardrail.log.
pub fn project_dir(project_hash: &str) -> PathBuf {
    projects_dir().join(project_hash)
}

pub fn session_state_path(project_dir: &Path) -> PathBuf {
    project_dir.join("session_state.json")
}

pub fn cache_path(project_dir: &Path) -> PathBuf {
    project_dir.join("verdict_cache.json")
}

pub fn backups_dir(project_dir: &Path) -> PathBuf {
    project_dir.join("backups")
}

pub fn analytics_db_path(project_dir: &Path) -> PathBuf {
    project_dir.join("analytics.db")
}

pub fn log_path(project_dir: &Path) -> PathBuf {
    project_dir.join("guardrail.log")
}

/// Pure hash of an already-canonicalized path (no I/O).
pub fn hash_path_string(canonical_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_path.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..PROJECT_HASH_LEN].to_string()
}

/// Project hash with canonicalize() (resolves symlinks). Falls back to the
/// raw string when the path does not exist yet.
pub fn project_hash(project_root: &Path) -> String {
    let canonical = project_root
        .canonicalize()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| project_root.to_string_lossy().to_string());
    hash_path_string(&canonical)
}
