//! Aggregate reports over the learning store.
//!
//! Externally triggered (CLI), never on a timer inside the recorder.
//! Surfaces block/allow counts per policy and per fingerprint — the raw
//! material for deciding which policies earn their keep.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::storage::database;
use crate::GuardResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyCounts {
    pub policy_id: String,
    pub allows: u64,
    pub blocks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FingerprintCounts {
    pub fingerprint: String,
    pub policy_id: String,
    pub allows: u64,
    pub blocks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalyticsReport {
    pub total_records: u64,
    pub per_policy: Vec<PolicyCounts>,
    pub per_fingerprint: Vec<FingerprintCounts>,
}

/// Build the aggregate report. A missing store yields an empty report —
/// analytics never invent an error where there is simply no data yet.
pub fn report(db_path: &Path) -> GuardResult<AnalyticsReport> {
    if !db_path.exists() {
        return Ok(AnalyticsReport::default());
    }
    let conn = database::open_analytics_db(db_path)?;

    let total_records: u64 =
        conn.query_row("SELECT COUNT(*) FROM learning_records", [], |r| r.get(0))?;

    let mut per_policy = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT policy_id,
                    SUM(CASE WHEN verdict = 'allow' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN verdict = 'block' THEN 1 ELSE 0 END)
             FROM learning_records
             GROUP BY policy_id
             ORDER BY policy_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PolicyCounts {
                policy_id: row.get(0)?,
                allows: row.get(1)?,
                blocks: row.get(2)?,
            })
        })?;
        for row in rows {
            per_policy.push(row?);
        }
    }

    let mut per_fingerprint = Vec::new();
    {
        let mut stmt = conn.prepare(
            "SELECT fingerprint, policy_id,
                    SUM(CASE WHEN verdict = 'allow' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN verdict = 'block' THEN 1 ELSE 0 END)
             FROM learning_records
             GROUP BY fingerprint, policy_id
             ORDER BY fingerprint, policy_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(FingerprintCounts {
                fingerprint: row.get(0)?,
                policy_id: row.get(1)?,
                allows: row.get(2)?,
                blocks: row.get(3)?,
            })
        })?;
        for row in rows {
            per_fingerprint.push(row?);
        }
    }

    Ok(AnalyticsReport {
        total_records,
        per_policy,
        per_fingerprint,
    })
}
