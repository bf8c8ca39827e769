//! An in-memory [`BundleHost`]/[`BundleFactory`] pair used by tests and by
//! the CLI's explicit `AMPLIFIER_BUNDLE=fixture` debug mode. Never selected
//! implicitly (see `DESIGN.md`, Open Question 4: no mock mode).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tokio_stream::StreamExt;

use crate::event::{ApprovalDefault, BundleEvent};
use crate::host::{BundleDefinition, BundleEventStream, BundleFactory, BundleHost};

/// Replies with a fixed "hi" text response, optionally requiring approval
/// of a fixed tool call first when `require_approval` is set.
pub struct FixtureBundleHost {
    name: String,
    require_approval: bool,
    cancelled: AtomicBool,
}

impl FixtureBundleHost {
    #[must_use]
    pub fn new(name: impl Into<String>, require_approval: bool) -> Self {
        Self {
            name: name.into(),
            require_approval,
            cancelled: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl BundleHost for FixtureBundleHost {
    async fn execute(&self, _prompt: serde_json::Value) -> BundleEventStream {
        let mut events = vec![BundleEvent::ContentBlockStart {
            index: 0,
            block_type: "text".to_string(),
        }];
        if self.require_approval {
            events.push(BundleEvent::ApprovalRequired {
                prompt: "Run `ls`?".to_string(),
                options: vec!["Allow once".to_string(), "Allow always".to_string(), "Deny".to_string()],
                timeout_secs: 30.0,
                default: ApprovalDefault::Deny,
            });
        }
        events.push(BundleEvent::ContentBlockDelta {
            index: 0,
            delta: json!({"text": "hi"}),
        });
        events.push(BundleEvent::ContentBlockEnd {
            index: 0,
            block: json!({"type": "text", "text": "hi"}),
        });
        Box::pin(tokio_stream::iter(events))
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Always succeeds, yielding a [`FixtureBundleHost`].
#[derive(Default)]
pub struct FixtureBundleFactory;

#[async_trait]
impl BundleFactory for FixtureBundleFactory {
    async fn create(
        &self,
        definition: &BundleDefinition,
    ) -> Result<Arc<dyn BundleHost>, amp_protocol::ProtocolError> {
        let name = definition.name.clone().unwrap_or_else(|| "fixture".to_string());
        let require_approval = definition.behaviors.iter().any(|b| b == "require_approval");
        Ok(Arc::new(FixtureBundleHost::new(name, require_approval)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_host_emits_a_text_block() {
        let host = FixtureBundleHost::new("fixture", false);
        let events: Vec<_> = host.execute(json!("hi")).await.collect().await;
        assert!(matches!(events[0], BundleEvent::ContentBlockStart { .. }));
        assert!(events.iter().any(|e| matches!(e, BundleEvent::ContentBlockEnd { .. })));
    }

    #[tokio::test]
    async fn fixture_factory_respects_require_approval_behavior() {
        let factory = FixtureBundleFactory;
        let def = BundleDefinition {
            behaviors: vec!["require_approval".to_string()],
            ..Default::default()
        };
        let host = factory.create(&def).await.unwrap();
        let events: Vec<_> = host.execute(json!("hi")).await.collect().await;
        assert!(events.iter().any(|e| matches!(e, BundleEvent::ApprovalRequired { .. })));
    }
}
