//! Bundle event → protocol event mapping (`SPEC_FULL.md` §4.3).

use amp_bundle::{ApprovalDefault, BundleEvent};
use serde_json::{Value, json};

use crate::turn::TurnEvent;

const IMAGE_SENTINEL: &str = "[image data omitted]";
const IMAGE_INLINE_THRESHOLD: usize = 1024;

/// What a single [`BundleEvent`] becomes once mapped.
///
/// A closed match over [`BundleEvent`] produces this — see `DESIGN.md` Open
/// Question 3: `PromptSubmit`/`PromptComplete` are explicit `Suppressed`
/// arms, not a default fallthrough.
pub enum MappedEvent {
    Emit(TurnEvent),
    Suppressed,
    NeedsApproval {
        prompt: String,
        options: Vec<String>,
        timeout_secs: f64,
        default: ApprovalDefault,
    },
}

/// Map one bundle event, honoring `show_thinking` and sanitizing any
/// oversized inline image payload.
#[must_use]
pub fn map_bundle_event(show_thinking: bool, event: &BundleEvent) -> MappedEvent {
    match event {
        BundleEvent::ContentBlockStart { index, block_type } => MappedEvent::Emit(TurnEvent::new(
            "content.start",
            json!({"index": index, "block_type": block_type}),
        )),
        BundleEvent::ContentBlockDelta { index, delta } => MappedEvent::Emit(TurnEvent::new(
            "content.delta",
            json!({"index": index, "delta": sanitize(delta.clone())}),
        )),
        BundleEvent::ContentBlockEnd { index, block } => MappedEvent::Emit(TurnEvent::new(
            "content.end",
            json!({"index": index, "block": sanitize(block.clone())}),
        )),
        BundleEvent::ThinkingDelta { text } => {
            if show_thinking {
                MappedEvent::Emit(TurnEvent::new("thinking.delta", json!({"text": text})))
            } else {
                MappedEvent::Suppressed
            }
        }
        BundleEvent::ThinkingFinal { text } => {
            if show_thinking {
                MappedEvent::Emit(TurnEvent::new("thinking.end", json!({"text": text})))
            } else {
                MappedEvent::Suppressed
            }
        }
        BundleEvent::ToolPre { call_id, name, input } => MappedEvent::Emit(TurnEvent::new(
            "tool.call",
            json!({"call_id": call_id, "name": name, "input": sanitize(input.clone())}),
        )),
        BundleEvent::ToolPost { call_id, result } => MappedEvent::Emit(TurnEvent::new(
            "tool.result",
            json!({"call_id": call_id, "result": sanitize(result.clone())}),
        )),
        BundleEvent::ToolError { call_id, message } => MappedEvent::Emit(TurnEvent::new(
            "tool.error",
            json!({"call_id": call_id, "message": message}),
        )),
        BundleEvent::ApprovalRequired { prompt, options, timeout_secs, default } => {
            MappedEvent::NeedsApproval {
                prompt: prompt.clone(),
                options: options.clone(),
                timeout_secs: *timeout_secs,
                default: *default,
            }
        }
        BundleEvent::PromptSubmit | BundleEvent::PromptComplete => MappedEvent::Suppressed,
        BundleEvent::Error { message } => {
            MappedEvent::Emit(TurnEvent::new("error", json!({"message": message})))
        }
        BundleEvent::Other { event_type, data } => {
            MappedEvent::Emit(TurnEvent::new(event_type.replace(':', "."), sanitize(data.clone())))
        }
    }
}

/// Replace any inline image payload larger than 1 kB with a sentinel. The
/// only transformation this mapping performs on payload contents.
fn sanitize(mut value: Value) -> Value {
    sanitize_in_place(&mut value);
    value
}

fn sanitize_in_place(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let is_image = map.get("type").and_then(Value::as_str) == Some("image");
            if is_image {
                if let Some(source) = map.get_mut("source").and_then(Value::as_object_mut) {
                    if let Some(data) = source.get("data").and_then(Value::as_str) {
                        if data.len() > IMAGE_INLINE_THRESHOLD {
                            source.insert("data".to_string(), Value::String(IMAGE_SENTINEL.to_string()));
                        }
                    }
                }
            }
            for v in map.values_mut() {
                sanitize_in_place(v);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                sanitize_in_place(v);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thinking_suppressed_when_disabled() {
        let ev = BundleEvent::ThinkingDelta { text: "hmm".into() };
        assert!(matches!(map_bundle_event(false, &ev), MappedEvent::Suppressed));
        assert!(matches!(map_bundle_event(true, &ev), MappedEvent::Emit(_)));
    }

    #[test]
    fn prompt_submit_and_complete_are_explicitly_suppressed() {
        assert!(matches!(map_bundle_event(true, &BundleEvent::PromptSubmit), MappedEvent::Suppressed));
        assert!(matches!(map_bundle_event(true, &BundleEvent::PromptComplete), MappedEvent::Suppressed));
    }

    #[test]
    fn approval_required_becomes_needs_approval() {
        let ev = BundleEvent::ApprovalRequired {
            prompt: "run?".into(),
            options: vec!["Allow".into(), "Deny".into()],
            timeout_secs: 30.0,
            default: ApprovalDefault::Deny,
        };
        assert!(matches!(map_bundle_event(true, &ev), MappedEvent::NeedsApproval { .. }));
    }

    #[test]
    fn large_inline_image_is_sanitized() {
        let big_data = "x".repeat(2000);
        let delta = json!({"type": "image", "source": {"data": big_data}});
        let ev = BundleEvent::ContentBlockDelta { index: 0, delta };
        let MappedEvent::Emit(turn) = map_bundle_event(true, &ev) else { panic!() };
        assert_eq!(turn.data["delta"]["source"]["data"], IMAGE_SENTINEL);
    }

    #[test]
    fn small_inline_image_passes_through() {
        let delta = json!({"type": "image", "source": {"data": "short"}});
        let ev = BundleEvent::ContentBlockDelta { index: 0, delta: delta.clone() };
        let MappedEvent::Emit(turn) = map_bundle_event(true, &ev) else { panic!() };
        assert_eq!(turn.data["delta"]["source"]["data"], "short");
    }

    #[test]
    fn other_event_dotted_renamed() {
        let ev = BundleEvent::Other { event_type: "session:created".into(), data: json!({}) };
        let MappedEvent::Emit(turn) = map_bundle_event(true, &ev) else { panic!() };
        assert_eq!(turn.event_type, "session.created");
    }
}
