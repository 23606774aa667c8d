//! Event — one intercepted intent submitted to the engine for a decision.
//!
//! Deserialized from the hook's stdin JSON. Immutable once dispatched;
//! scoped to a single scheduling pass.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of operation the caller is about to perform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Modify,
    #[default]
    #[serde(other)]
    Other,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Other => "other",
        }
    }
}

/// One intercepted operation. The engine never mutates an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique per dispatch, stamped at parse time.
    #[serde(default = "event_id")]
    pub id: String,
    #[serde(rename = "operation", default)]
    pub operation_kind: OperationKind,
    /// Path the operation targets. Absent for non-file operations.
    #[serde(default)]
    pub target_path: Option<String>,
    /// Content being written/edited. Absent for reads and deletes.
    #[serde(default)]
    pub payload: Option<String>,
    /// Free-form caller context, e.g. the natural-language instruction.
    #[serde(rename = "metadata", default)]
    pub caller_metadata: HashMap<String, String>,
}

fn event_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl Event {
    pub fn new(operation_kind: OperationKind) -> Self {
        Self {
            id: event_id(),
            operation_kind,
            target_path: None,
            payload: None,
            caller_metadata: HashMap::new(),
        }
    }

    pub fn with_target(mut self, path: impl Into<String>) -> Self {
        self.target_path = Some(path.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Parse an event from the hook's stdin JSON.
    pub fn from_json(input: &str) -> crate::GuardResult<Self> {
        let event: Event = serde_json::from_str(input)?;
        Ok(event)
    }

    /// Coarse file type: lowercase extension of the target path, or "none".
    /// Used by analytics fingerprinting — never by policies themselves.
    pub fn file_kind(&self) -> String {
        self.target_path
            .as_deref()
            .and_then(|p| std::path::Path::new(p).extension())
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| "none".to_string())
    }

    /// True when the event carries enough material to be cache-addressable.
    pub fn is_cacheable(&self) -> bool {
        self.target_path.is_some() && self.payload.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_event() {
        let event = Event::from_json(r#"{"operation": "create"}"#).unwrap();
        assert_eq!(event.operation_kind, OperationKind::Create);
        assert!(event.target_path.is_none());
        assert!(event.payload.is_none());
        assert!(!event.id.is_empty());
    }

    #[test]
    fn test_parse_full_event() {
        let event = Event::from_json(
            r#"{"operation": "modify", "target_path": "src/auth.rs",
                "payload": "fn main() {}", "metadata": {"instruction": "fix auth"}}"#,
        )
        .unwrap();
        assert_eq!(event.operation_kind, OperationKind::Modify);
        assert_eq!(event.target_path.as_deref(), Some("src/auth.rs"));
        assert!(event.is_cacheable());
        assert_eq!(event.caller_metadata["instruction"], "fix auth");
    }

    #[test]
    fn test_unknown_operation_maps_to_other() {
        let event = Event::from_json(r#"{"operation": "rename"}"#).unwrap();
        assert_eq!(event.operation_kind, OperationKind::Other);
    }

    #[test]
    fn test_file_kind() {
        let event = Event::new(OperationKind::Create).with_target("lib/Auth_V2.JS");
        assert_eq!(event.file_kind(), "js");
        let bare = Event::new(OperationKind::Other);
        assert_eq!(bare.file_kind(), "none");
    }
}
