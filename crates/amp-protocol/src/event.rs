//! The server → client response envelope.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single server event.
///
/// `correlation_id` absent means the event is server-initiated (a
/// notification, heartbeat, or approval request) and never carries
/// `sequence`. Within one correlation, `sequence` is contiguous starting at
/// 0; `is_final` (wire name `final`) marks the last event for that
/// correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub data: Value,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    #[serde(rename = "final")]
    pub is_final: bool,
}

impl Event {
    fn now() -> String {
        Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }

    /// Build an uncorrelated, server-initiated event (no `sequence`).
    #[must_use]
    pub fn uncorrelated(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            event_type: event_type.into(),
            correlation_id: None,
            data,
            timestamp: Self::now(),
            sequence: None,
            is_final: false,
        }
    }

    /// Build an event correlated to `correlation_id` at `sequence`.
    #[must_use]
    pub fn correlated(
        event_type: impl Into<String>,
        correlation_id: impl Into<String>,
        sequence: u64,
        is_final: bool,
        data: Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            event_type: event_type.into(),
            correlation_id: Some(correlation_id.into()),
            data,
            timestamp: Self::now(),
            sequence: Some(sequence),
            is_final,
        }
    }
}

/// Per-correlation sequence counter.
///
/// One [`Sequencer`] is created per dispatched [`crate::Command`]; every
/// event yielded for that command is stamped via [`Sequencer::next`], which
/// enforces the "0, 1, 2, ... contiguous" invariant by construction.
#[derive(Debug)]
pub struct Sequencer {
    correlation_id: String,
    next_seq: u64,
}

impl Sequencer {
    #[must_use]
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            next_seq: 0,
        }
    }

    /// Stamp and return the next event in this correlation.
    pub fn next(&mut self, event_type: impl Into<String>, is_final: bool, data: Value) -> Event {
        let seq = self.next_seq;
        self.next_seq += 1;
        Event::correlated(event_type, self.correlation_id.clone(), seq, is_final, data)
    }

    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uncorrelated_event_has_no_sequence() {
        let ev = Event::uncorrelated("heartbeat", json!({}));
        assert!(ev.correlation_id.is_none());
        assert!(ev.sequence.is_none());
        let wire = serde_json::to_value(&ev).unwrap();
        assert!(wire.get("sequence").is_none());
        assert!(wire.get("correlationId").is_none());
    }

    #[test]
    fn event_type_serializes_as_type() {
        let ev = Event::uncorrelated("connected", json!({}));
        let wire = serde_json::to_value(&ev).unwrap();
        assert_eq!(wire["type"], "connected");
        assert!(wire.get("eventType").is_none());
    }

    #[test]
    fn is_final_serializes_as_final() {
        let ev = Event::correlated("result", "cmd_1", 0, true, json!({}));
        let wire = serde_json::to_value(&ev).unwrap();
        assert_eq!(wire["final"], true);
    }

    #[test]
    fn sequencer_is_contiguous_from_zero() {
        let mut seq = Sequencer::new("cmd_1");
        let a = seq.next("ack", false, json!({}));
        let b = seq.next("content.delta", false, json!({}));
        let c = seq.next("result", true, json!({}));
        assert_eq!(a.sequence, Some(0));
        assert_eq!(b.sequence, Some(1));
        assert_eq!(c.sequence, Some(2));
        assert!(c.is_final);
        assert_eq!(a.correlation_id.as_deref(), Some("cmd_1"));
    }

    #[test]
    fn round_trip() {
        let ev = Event::correlated("result", "cmd_1", 3, true, json!({"ok": true}));
        let wire = serde_json::to_string(&ev).unwrap();
        let back: Event = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, ev);
    }
}
