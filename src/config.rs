//! Engine configuration — families, policies, scheduler, cache, backup,
//! analytics.
//!
//! Persisted as `guardrail.json` in the project data dir. Every section is
//! independently defaultable: a malformed document or an unknown field never
//! aborts startup, the affected section just falls back to its documented
//! defaults. Env flags (read once at startup) can disable whole families
//! without editing the document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::policy::{FamilySettings, PolicySettings};

const CONFIG_FILE: &str = "guardrail.json";

/// Env prefix for family kill switches: `GUARDRAIL_DISABLE_SECURITY=1`
/// disables the "security" family regardless of the config document.
const DISABLE_FAMILY_PREFIX: &str = "GUARDRAIL_DISABLE_";
const NO_CACHE_ENV: &str = "GUARDRAIL_NO_CACHE";

// ============================================================================
// SCHEDULER
// ============================================================================

/// Per-tier concurrency ceilings and the advisory event budget.
///
/// The numeric defaults are tunable, not load-bearing: the critical tier is
/// always sequential and the background tier is fire-and-forget, so only
/// high/medium/low take a ceiling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    #[serde(default = "default_high_concurrency")]
    pub high_concurrency: usize,
    #[serde(default = "default_medium_concurrency")]
    pub medium_concurrency: usize,
    #[serde(default = "default_low_concurrency")]
    pub low_concurrency: usize,
    /// Soft per-event budget. Logged when exceeded, never enforced.
    #[serde(default = "default_global_budget")]
    pub global_budget_ms: u64,
}

fn default_high_concurrency() -> usize {
    3
}
fn default_medium_concurrency() -> usize {
    5
}
fn default_low_concurrency() -> usize {
    4
}
fn default_global_budget() -> u64 {
    500
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            high_concurrency: default_high_concurrency(),
            medium_concurrency: default_medium_concurrency(),
            low_concurrency: default_low_concurrency(),
            global_budget_ms: default_global_budget(),
        }
    }
}

// ============================================================================
// CACHE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides `{project_dir}` as the cache location when set.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_cache_max_age")]
    pub max_age_secs: u64,
}

fn default_cache_max_age() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            max_age_secs: default_cache_max_age(),
        }
    }
}

// ============================================================================
// BACKUP
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides `{project_dir}/backups` as the backup location when set.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_retention_days() -> i64 {
    7
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            retention_days: default_retention_days(),
        }
    }
}

// ============================================================================
// ANALYTICS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Queue slots between the pipeline and the writer thread. When full,
    /// the oldest pending record is dropped — never backpressure.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: default_queue_capacity(),
        }
    }
}

// ============================================================================
// TOP-LEVEL CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GuardConfig {
    /// Family name → settings. Families absent here get `FamilySettings`
    /// defaults (enabled, warning-only, 3000 ms).
    #[serde(default)]
    pub families: HashMap<String, FamilySettings>,
    /// Policy id → overrides. Unset fields inherit from the family row.
    #[serde(default)]
    pub policies: HashMap<String, PolicySettings>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

fn default_true() -> bool {
    true
}

impl GuardConfig {
    /// Load from `{project_dir}/guardrail.json`, then apply env overrides.
    /// Missing or malformed documents fall back to defaults — config
    /// problems must never abort the pipeline.
    pub fn load(project_dir: &Path) -> Self {
        let path = project_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                    tracing::warn!(path = %path.display(), error = %e, "Malformed guardrail.json — using defaults");
                    Self::default()
                }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Unreadable guardrail.json — using defaults");
                    Self::default()
                }
            }
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config
    }

    /// Save to `{project_dir}/guardrail.json`. Best effort.
    pub fn save(&self, project_dir: &Path) {
        std::fs::create_dir_all(project_dir).ok();
        let path = project_dir.join(CONFIG_FILE);
        if let Ok(json) = serde_json::to_string_pretty(self) {
            if let Err(e) = std::fs::write(&path, json) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to write config");
            }
        }
    }

    /// Env kill switches, read once here at startup.
    fn apply_env_overrides(&mut self) {
        for (key, _) in std::env::vars() {
            if let Some(family) = key.strip_prefix(DISABLE_FAMILY_PREFIX) {
                if family == "CACHE" || family.is_empty() {
                    continue;
                }
                let family = family.to_lowercase().replace('_', "-");
                tracing::info!(family = %family, "Family disabled via env flag");
                self.families.entry(family).or_default().enabled = false;
            }
        }
        if std::env::var(NO_CACHE_ENV).is_ok() {
            tracing::info!("Cache disabled via env flag");
            self.cache.enabled = false;
        }
    }

    /// Settings for a family, defaulted when unconfigured.
    pub fn family(&self, name: &str) -> FamilySettings {
        self.families.get(name).cloned().unwrap_or_default()
    }

    /// Truncated sha256 of the canonical serialized document. Any config
    /// change invalidates every cache entry through the key, with no
    /// explicit invalidation logic.
    pub fn config_hash(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let hex = format!("{:x}", hasher.finalize());
        hex[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::policy::BlockingBehavior;

    // Env flags are process-global; tests touching or asserting them take
    // this lock
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_missing_file_gives_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let config = GuardConfig::load(dir.path());
        assert!(config.cache.enabled);
        assert_eq!(config.backup.retention_days, 7);
        assert_eq!(config.scheduler.medium_concurrency, 5);
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();
        let config = GuardConfig::load(dir.path());
        assert_eq!(config, {
            let mut c = GuardConfig::default();
            c.apply_env_overrides();
            c
        });
    }

    #[test]
    fn test_env_flag_disables_family() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("GUARDRAIL_DISABLE_NOISE_CHECKS", "1");
        let config = GuardConfig::load(dir.path());
        std::env::remove_var("GUARDRAIL_DISABLE_NOISE_CHECKS");

        // Underscores in the flag map to the hyphenated family name
        assert!(!config.family("noise-checks").enabled);
        assert!(config.family("security").enabled);
    }

    #[test]
    fn test_env_flag_disables_cache() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var(NO_CACHE_ENV, "1");
        let config = GuardConfig::load(dir.path());
        std::env::remove_var(NO_CACHE_ENV);

        assert!(!config.cache.enabled);
        // The cache flag must not masquerade as a family switch
        assert!(config.families.is_empty());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"families": {"security": {"blocking": "hard-block"}}}"#,
        )
        .unwrap();
        let config = GuardConfig::load(dir.path());
        let security = config.family("security");
        assert_eq!(security.blocking, BlockingBehavior::HardBlock);
        assert!(security.enabled);
        assert_eq!(security.timeout_ms, 3000);
        // Untouched sections keep defaults
        assert_eq!(config.cache.max_age_secs, 3600);
    }

    #[test]
    fn test_config_hash_changes_with_content() {
        let a = GuardConfig::default();
        let mut b = GuardConfig::default();
        b.cache.max_age_secs = 60;
        assert_ne!(a.config_hash(), b.config_hash());
        assert_eq!(a.config_hash(), GuardConfig::default().config_hash());
        assert_eq!(a.config_hash().len(), 16);
    }

    #[test]
    fn test_roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GuardConfig::default();
        config.backup.retention_days = 30;
        config.save(dir.path());
        let loaded = GuardConfig::load(dir.path());
        assert_eq!(loaded.backup.retention_days, 30);
    }
}
