//! The display back-channel: a fire-and-forget sibling of the approval
//! back-channel, used to show informational messages to the client.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde_json::json;
use tokio::sync::mpsc;

use crate::turn::TurnEvent;

/// Emits `display.message` events, tagged with a nesting depth so a
/// sub-session's output can be visually distinguished from its parent's.
pub struct DisplayBackChannel {
    nesting_depth: AtomicU32,
}

impl Default for DisplayBackChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayBackChannel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nesting_depth: AtomicU32::new(0),
        }
    }

    pub async fn show_message(&self, emit: &mpsc::Sender<TurnEvent>, text: &str, level: &str, source: &str) {
        let depth = self.nesting_depth.load(Ordering::Relaxed);
        let _ = emit
            .send(TurnEvent::new(
                "display.message",
                json!({"text": text, "level": level, "source": source, "nesting_depth": depth}),
            ))
            .await;
    }

    /// A fresh handler with nesting depth one greater than this one's,
    /// used when a session spawns a child session.
    #[must_use]
    pub fn nested(&self) -> Arc<Self> {
        Arc::new(Self {
            nesting_depth: AtomicU32::new(self.nesting_depth.load(Ordering::Relaxed) + 1),
        })
    }

    #[must_use]
    pub fn nesting_depth(&self) -> u32 {
        self.nesting_depth.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn show_message_carries_nesting_depth() {
        let dc = DisplayBackChannel::new();
        let (tx, mut rx) = mpsc::channel(4);
        dc.show_message(&tx, "hello", "info", "tool:ls").await;
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.data["nesting_depth"], 0);
        assert_eq!(ev.data["text"], "hello");
    }

    #[test]
    fn nested_increments_depth() {
        let dc = DisplayBackChannel::new();
        let child = dc.nested();
        assert_eq!(child.nesting_depth(), 1);
        let grandchild = child.nested();
        assert_eq!(grandchild.nesting_depth(), 2);
    }
}
