//! On-disk shapes: one transcript message and one session's metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line of `transcript.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: Value,
    pub timestamp: String,
}

impl Message {
    #[must_use]
    pub fn is_persisted_role(&self) -> bool {
        !matches!(self.role.as_str(), "system" | "developer")
    }
}

/// The whole of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
    #[serde(default)]
    pub turn_count: u64,
    pub created: String,
    pub updated: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<String>,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn default_state() -> String {
    "created".to_string()
}

/// Filters accepted by [`crate::SessionStore::list_sessions`].
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub top_level_only: bool,
    pub min_turns: Option<u64>,
    pub state: Option<String>,
    pub limit: Option<usize>,
}

/// A session summary returned by `list_sessions`/`find_session`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub metadata: Metadata,
}
