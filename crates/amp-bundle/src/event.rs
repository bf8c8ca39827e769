//! Execution events emitted by a [`crate::BundleHost`].
//!
//! This is a closed enum, not a string tag: the session manager's mapping
//! to protocol events (`amp-runtime::session::map_bundle_event`) matches it
//! exhaustively, so a new variant here forces an explicit mapping decision
//! at compile time instead of silently falling through a wildcard arm.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum BundleEvent {
    ContentBlockStart { index: u32, block_type: String },
    ContentBlockDelta { index: u32, delta: Value },
    ContentBlockEnd { index: u32, block: Value },
    ThinkingDelta { text: String },
    ThinkingFinal { text: String },
    ToolPre { call_id: String, name: String, input: Value },
    ToolPost { call_id: String, result: Value },
    ToolError { call_id: String, message: String },
    ApprovalRequired {
        prompt: String,
        options: Vec<String>,
        timeout_secs: f64,
        default: ApprovalDefault,
    },
    PromptSubmit,
    PromptComplete,
    Error { message: String },
    Other { event_type: String, data: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDefault {
    Allow,
    Deny,
}
