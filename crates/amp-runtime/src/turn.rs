//! The session manager's logical output type, before a transport/command
//! handler stamps it with a `correlation_id` and `sequence`.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct TurnEvent {
    pub event_type: String,
    pub data: Value,
}

impl TurnEvent {
    #[must_use]
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}
