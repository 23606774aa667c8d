//! SQLite plumbing for the analytics learning store.
//!
//! One small WAL database per project (`analytics.db`). Safe to delete at
//! any time — the schema is recreated on the next open.

use std::path::Path;

use rusqlite::Connection;

use crate::{GuardError, GuardResult};

const BUSY_TIMEOUT_MS: u32 = 5000;

/// Open the analytics database with the standard pragmas, creating the
/// schema if needed.
pub fn open_analytics_db(path: &Path) -> GuardResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)
        .map_err(|e| GuardError::Storage(format!("Failed to open {}: {}", path.display(), e)))?;

    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = {};
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;",
        BUSY_TIMEOUT_MS,
    ))
    .map_err(|e| GuardError::Storage(format!("Failed to configure pragmas: {}", e)))?;

    migrate(&conn)?;

    tracing::debug!(path = %path.display(), "Analytics database opened");
    Ok(conn)
}

fn migrate(conn: &Connection) -> GuardResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS learning_records (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             policy_id TEXT NOT NULL,
             fingerprint TEXT NOT NULL,
             verdict TEXT NOT NULL,
             timestamp TEXT NOT NULL,
             context_features TEXT NOT NULL DEFAULT '{}'
         );
         CREATE INDEX IF NOT EXISTS idx_learning_policy
             ON learning_records(policy_id);
         CREATE INDEX IF NOT EXISTS idx_learning_fingerprint
             ON learning_records(fingerprint);",
    )
    .map_err(|e| GuardError::Storage(format!("Failed to migrate analytics schema: {}", e)))?;
    Ok(())
}
