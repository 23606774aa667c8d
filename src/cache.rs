//! Cache Layer — content-addressed memoization of policy verdicts.
//!
//! Key = sha256 over (policy id, target path, payload, config hash), so any
//! content or configuration change invalidates an entry with no explicit
//! invalidation logic. TTL is checked lazily on read; there is no background
//! sweeper. Disabling the cache makes `get` always miss and `set` a no-op —
//! callers never special-case it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::CacheConfig;
use crate::policy::{ExecutionResult, Verdict};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub policy_id: String,
    pub verdict: Verdict,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct VerdictCache {
    enabled: bool,
    path: PathBuf,
    max_age: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl VerdictCache {
    pub fn open(project_dir: &std::path::Path, config: &CacheConfig) -> Self {
        let path = config
            .directory
            .as_ref()
            .map(|d| d.join("verdict_cache.json"))
            .unwrap_or_else(|| crate::storage::path_utils::cache_path(project_dir));
        let entries = if config.enabled {
            Self::load_entries(&path)
        } else {
            HashMap::new()
        };
        Self {
            enabled: config.enabled,
            path,
            max_age: Duration::seconds(config.max_age_secs as i64),
            entries: Mutex::new(entries),
        }
    }

    fn load_entries(path: &std::path::Path) -> HashMap<String, CacheEntry> {
        if !path.exists() {
            return HashMap::new();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt verdict cache — starting empty");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        }
    }

    /// Stable key over the memoization tuple.
    pub fn cache_key(policy_id: &str, path: &str, content: &str, config_hash: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(policy_id.as_bytes());
        hasher.update([0]);
        hasher.update(path.as_bytes());
        hasher.update([0]);
        hasher.update(content.as_bytes());
        hasher.update([0]);
        hasher.update(config_hash.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a memoized verdict. Expired entries are evicted here, on
    /// read. Hits come back with `from_cache = true` and zero duration.
    pub fn get(
        &self,
        policy_id: &str,
        path: &str,
        content: &str,
        config_hash: &str,
    ) -> Option<ExecutionResult> {
        if !self.enabled {
            return None;
        }
        let key = Self::cache_key(policy_id, path, content, config_hash);
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());

        let entry = entries.get(&key)?;
        if Utc::now() - entry.created_at > self.max_age {
            tracing::debug!(policy = policy_id, "Cache entry expired — evicting");
            entries.remove(&key);
            return None;
        }

        tracing::debug!(policy = policy_id, "Cache hit");
        Some(ExecutionResult {
            policy_id: entry.policy_id.clone(),
            verdict: entry.verdict,
            message: entry.message.clone(),
            duration_ms: 0,
            from_cache: true,
            error: None,
        })
    }

    /// Memoize a result. Errored results are the caller's responsibility
    /// to filter — the cache stores whatever it is given.
    pub fn set(
        &self,
        policy_id: &str,
        path: &str,
        content: &str,
        config_hash: &str,
        result: &ExecutionResult,
    ) {
        if !self.enabled {
            return;
        }
        let key = Self::cache_key(policy_id, path, content, config_hash);
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.insert(
            key,
            CacheEntry {
                policy_id: policy_id.to_string(),
                verdict: result.verdict,
                message: result.message.clone(),
                created_at: Utc::now(),
            },
        );
        self.persist(&entries);
    }

    /// Drop expired entries eagerly (cleanup CLI), then persist.
    pub fn prune_expired(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        let cutoff = Utc::now() - self.max_age;
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let before = entries.len();
        entries.retain(|_, e| e.created_at >= cutoff);
        let pruned = before - entries.len();
        if pruned > 0 {
            self.persist(&entries);
        }
        pruned
    }

    fn persist(&self, entries: &HashMap<String, CacheEntry>) {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        // Expired entries are dropped on save as well as on read
        let cutoff = Utc::now() - self.max_age;
        let live: HashMap<&String, &CacheEntry> = entries
            .iter()
            .filter(|(_, e)| e.created_at >= cutoff)
            .collect();
        match serde_json::to_string(&live) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    tracing::warn!(path = %self.path.display(), error = %e, "Failed to write verdict cache");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize verdict cache"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(policy_id: &str, verdict: Verdict, message: Option<&str>) -> ExecutionResult {
        ExecutionResult {
            policy_id: policy_id.to_string(),
            verdict,
            message: message.map(String::from),
            duration_ms: 12,
            from_cache: false,
            error: None,
        }
    }

    fn cache(dir: &std::path::Path, enabled: bool, max_age_secs: u64) -> VerdictCache {
        VerdictCache::open(
            dir,
            &CacheConfig { enabled, directory: None, max_age_secs },
        )
    }

    #[test]
    fn test_hit_preserves_verdict_and_message() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), true, 3600);
        let r = result("dup-naming", Verdict::Block, Some("duplicate-suffix file name not allowed"));
        cache.set("dup-naming", "auth_v2.js", "content", "cfg1", &r);

        let hit = cache.get("dup-naming", "auth_v2.js", "content", "cfg1").unwrap();
        assert!(hit.from_cache);
        assert_eq!(hit.verdict, Verdict::Block);
        assert_eq!(hit.message.as_deref(), Some("duplicate-suffix file name not allowed"));
    }

    #[test]
    fn test_content_change_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), true, 3600);
        cache.set("p", "lib.rs", "old content", "cfg", &result("p", Verdict::Allow, None));
        assert!(cache.get("p", "lib.rs", "new content", "cfg").is_none());
        assert!(cache.get("p", "lib.rs", "old content", "cfg").is_some());
    }

    #[test]
    fn test_config_change_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), true, 3600);
        cache.set("p", "lib.rs", "content", "cfg-a", &result("p", Verdict::Allow, None));
        assert!(cache.get("p", "lib.rs", "content", "cfg-b").is_none());
    }

    #[test]
    fn test_expired_entry_evicted_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), true, 60);
        cache.set("p", "a.rs", "x", "cfg", &result("p", Verdict::Allow, None));
        // Backdate the entry past the TTL
        {
            let mut entries = cache.entries.lock().unwrap();
            for entry in entries.values_mut() {
                entry.created_at = Utc::now() - Duration::seconds(120);
            }
        }
        assert!(cache.get("p", "a.rs", "x", "cfg").is_none());
        // Evicted, not just hidden
        assert!(cache.entries.lock().unwrap().is_empty());
    }

    #[test]
    fn test_disabled_always_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path(), false, 3600);
        cache.set("p", "a.rs", "x", "cfg", &result("p", Verdict::Block, Some("m")));
        assert!(cache.get("p", "a.rs", "x", "cfg").is_none());
    }

    #[test]
    fn test_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        {
            let c = cache(dir.path(), true, 3600);
            c.set("p", "a.rs", "x", "cfg", &result("p", Verdict::Allow, None));
        }
        let c = cache(dir.path(), true, 3600);
        assert!(c.get("p", "a.rs", "x", "cfg").is_some());
    }

    #[test]
    fn test_corrupt_store_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("verdict_cache.json"), "not json").unwrap();
        let c = cache(dir.path(), true, 3600);
        assert!(c.get("p", "a.rs", "x", "cfg").is_none());
    }

    #[test]
    fn test_expired_entries_not_written_back() {
        let dir = tempfile::tempdir().unwrap();
        let c = cache(dir.path(), true, 60);
        c.set("stale", "a.rs", "x", "cfg", &result("stale", Verdict::Allow, None));
        {
            let mut entries = c.entries.lock().unwrap();
            let key = VerdictCache::cache_key("stale", "a.rs", "x", "cfg");
            entries.get_mut(&key).unwrap().created_at = Utc::now() - Duration::seconds(120);
        }
        // This write persists the map; the stale entry must not survive it
        c.set("fresh", "b.rs", "y", "cfg", &result("fresh", Verdict::Allow, None));

        let reopened = cache(dir.path(), true, 60);
        assert_eq!(reopened.entries.lock().unwrap().len(), 1);
        assert!(reopened.get("fresh", "b.rs", "y", "cfg").is_some());
    }

    #[test]
    fn test_prune_expired() {
        let dir = tempfile::tempdir().unwrap();
        let c = cache(dir.path(), true, 60);
        c.set("p1", "a.rs", "x", "cfg", &result("p1", Verdict::Allow, None));
        c.set("p2", "b.rs", "y", "cfg", &result("p2", Verdict::Allow, None));
        {
            let mut entries = c.entries.lock().unwrap();
            let key = VerdictCache::cache_key("p1", "a.rs", "x", "cfg");
            entries.get_mut(&key).unwrap().created_at = Utc::now() - Duration::seconds(120);
        }
        assert_eq!(c.prune_expired(), 1);
        assert!(c.get("p2", "b.rs", "y", "cfg").is_some());
    }
}
