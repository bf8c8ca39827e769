//! `ping` / `capabilities`.

use amp_protocol::{Command, ProtocolError};
use amp_runtime::TurnEvent;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::context::HandlerContext;
use crate::dispatch::CommandHandler;

/// Every event type this runtime can emit, kept here rather than derived so
/// `capabilities` can report them without depending on every crate that
/// produces one.
const KNOWN_EVENTS: &[&str] = &[
    "ack",
    "result",
    "error",
    "pong",
    "content.start",
    "content.delta",
    "content.end",
    "thinking.delta",
    "thinking.end",
    "tool.call",
    "tool.result",
    "tool.error",
    "approval.required",
    "approval.resolved",
    "approval.timeout",
    "display.message",
    "prompt.submit",
    "prompt.complete",
    "session.reset.started",
    "session.reset.completed",
    "bundle.install.progress",
];

pub struct PingHandler;

#[async_trait]
impl CommandHandler for PingHandler {
    fn success_event_type(&self) -> &'static str {
        "pong"
    }

    async fn handle(&self, _command: &Command, _ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        Ok(json!({}))
    }
}

/// Reports the command surface at construction time — registered last, once
/// every other handler is in place, so its own name is the only one missing.
pub struct CapabilitiesHandler {
    commands: Vec<String>,
}

impl CapabilitiesHandler {
    #[must_use]
    pub fn new(commands: Vec<String>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl CommandHandler for CapabilitiesHandler {
    async fn handle(&self, _command: &Command, ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        Ok(json!({
            "version": ctx.server_version,
            "protocol_version": ctx.protocol_version,
            "commands": self.commands,
            "events": KNOWN_EVENTS,
            "features": {
                "approvals": true,
                "display": true,
                "cancellation": true,
                "persistence": true,
                "sub_sessions": true,
                "thinking": true,
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use amp_bundle::fixture::FixtureBundleFactory;
    use amp_bus::EventBus;
    use amp_runtime::SessionManager;
    use std::sync::Arc;

    fn ctx() -> Arc<HandlerContext> {
        Arc::new(HandlerContext::new(
            Arc::new(SessionManager::new(None, EventBus::new(), Arc::new(FixtureBundleFactory))),
            EventBus::new(),
        ))
    }

    #[tokio::test]
    async fn ping_yields_pong_event() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("ping", PingHandler);
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        dispatcher.dispatch(Command::new("c1", "ping", Value::Null), ctx(), tx).await;
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.event_type, "pong");
        assert!(ev.is_final);
    }

    #[tokio::test]
    async fn capabilities_lists_registered_commands() {
        let handler = CapabilitiesHandler::new(vec!["ping".to_string(), "session.create".to_string()]);
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("capabilities", handler);
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        dispatcher.dispatch(Command::new("c1", "capabilities", Value::Null), ctx(), tx).await;
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.data["commands"], json!(["ping", "session.create"]));
        assert_eq!(ev.data["protocol_version"], "1");
    }
}
