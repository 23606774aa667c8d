//! Analytics — best-effort outcome recording for offline policy curation.
//!
//! Strictly observational: the recorder has no read path back into the
//! scheduler, so it can never introduce nondeterminism into decisions.
//! Raw content is never stored; recurring situations are grouped by a
//! coarse, stable fingerprint instead.

pub mod recorder;
pub mod report;

pub use recorder::AnalyticsRecorder;
pub use report::{report, AnalyticsReport};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::event::Event;

/// Truncated fingerprint length (hex chars).
const FINGERPRINT_LEN: usize = 16;

/// One observed (policy, situation, verdict) data point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningRecord {
    pub policy_id: String,
    pub fingerprint: String,
    pub verdict: String,
    pub timestamp: DateTime<Utc>,
    /// Coarse context (operation kind, file kind, cache/error flags) as a
    /// JSON object. Never the payload itself.
    pub context_features: serde_json::Value,
}

/// Stable hash over policy id + coarse file type + project signature.
/// Groups recurring situations without retaining raw content.
pub fn fingerprint(policy_id: &str, event: &Event, project_signature: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(policy_id.as_bytes());
    hasher.update([0]);
    hasher.update(event.file_kind().as_bytes());
    hasher.update([0]);
    hasher.update(project_signature.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..FINGERPRINT_LEN].to_string()
}
