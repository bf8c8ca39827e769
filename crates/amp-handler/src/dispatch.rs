//! Method registry and dispatch envelope (`SPEC_FULL.md` §4.4).
//!
//! Grounded on `tron-server/src/rpc/registry.rs`'s `MethodRegistry`: a
//! `HashMap<String, Arc<dyn Handler>>`, prometheus counters per dispatch, and
//! a slow-call warning. The envelope itself — optional leading `ack`,
//! intermediate events, exactly one terminal `result`/`error` — is this
//! runtime's addition over the teacher's plain request/response shape.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use amp_protocol::{Command, Event, ProtocolError, Sequencer};
use amp_runtime::TurnEvent;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::warn;

use crate::context::HandlerContext;

/// Implemented by every dispatchable command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Whether this command emits a leading `ack` before any further events
    /// (§4.4 point 1). Defaults to `false` for synchronous, single-`result`
    /// commands.
    fn is_streaming(&self) -> bool {
        false
    }

    /// The terminal event type on success. Every command yields `result`
    /// except `ping`, which yields `pong` (§4.4).
    fn success_event_type(&self) -> &'static str {
        "result"
    }

    /// Run the command, emitting intermediate events on `emit`, and return
    /// the data for the terminal `result` event (or an error for `error`).
    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext,
        emit: mpsc::Sender<TurnEvent>,
    ) -> Result<Value, ProtocolError>;
}

/// Maps dotted command names to handlers and drives the ack/event/terminal
/// envelope around each dispatch.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, cmd: &str, handler: impl CommandHandler + 'static) {
        self.handlers.insert(cmd.to_owned(), Arc::new(handler));
    }

    #[must_use]
    pub fn has_command(&self, cmd: &str) -> bool {
        self.handlers.contains_key(cmd)
    }

    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Dispatch one command, sending every produced [`Event`] on `out` in
    /// order: an optional `ack`, then intermediate events, then exactly one
    /// terminal `result` or `error`. Every event is also mirrored onto
    /// `ctx.bus` so the HTTP transport's `/event` observability feed sees
    /// it alongside uncorrelated notifications (approvals, display
    /// messages) published directly by the runtime.
    pub async fn dispatch(&self, command: Command, ctx: Arc<HandlerContext>, out: mpsc::Sender<Event>) {
        let cmd_name = command.cmd.clone();
        let mut seq = Sequencer::new(command.id.clone());
        metrics::counter!("amp_command_dispatch_total", "cmd" => cmd_name.clone()).increment(1);

        let emit = |event: Event, ctx: &HandlerContext, out: &mpsc::Sender<Event>| {
            ctx.bus.publish(&event);
            let out = out.clone();
            async move {
                let _ = out.send(event).await;
            }
        };

        let Some(handler) = self.handlers.get(&cmd_name).cloned() else {
            metrics::counter!("amp_command_errors_total", "cmd" => cmd_name.clone(), "code" => "UNKNOWN_COMMAND")
                .increment(1);
            let err = ProtocolError::UnknownCommand(cmd_name);
            emit(seq.next("error", true, json!(err.to_body())), &ctx, &out).await;
            return;
        };

        if handler.is_streaming() {
            emit(seq.next("ack", false, json!({})), &ctx, &out).await;
        }

        let (tx, mut rx) = mpsc::channel::<TurnEvent>(256);
        let spawned_handler = handler.clone();
        let spawned_ctx = ctx.clone();
        let spawned_command = command.clone();
        let join = tokio::spawn(async move { spawned_handler.handle(&spawned_command, &spawned_ctx, tx).await });

        let start = Instant::now();
        while let Some(turn_event) = rx.recv().await {
            emit(seq.next(turn_event.event_type, false, turn_event.data), &ctx, &out).await;
        }

        let terminal = match join.await {
            Ok(Ok(value)) => seq.next(handler.success_event_type(), true, value),
            Ok(Err(err)) => {
                metrics::counter!("amp_command_errors_total", "cmd" => cmd_name.clone(), "code" => err.code())
                    .increment(1);
                seq.next("error", true, json!(err.to_body()))
            }
            Err(join_err) => {
                let err = ProtocolError::HandlerError(join_err.to_string());
                metrics::counter!("amp_command_errors_total", "cmd" => cmd_name.clone(), "code" => "HANDLER_ERROR")
                    .increment(1);
                seq.next("error", true, json!(err.to_body()))
            }
        };

        let duration = start.elapsed();
        metrics::histogram!("amp_command_duration_seconds", "cmd" => cmd_name.clone()).record(duration.as_secs_f64());
        if duration.as_secs() >= 5 {
            warn!(cmd = %cmd_name, duration_secs = duration.as_secs_f64(), "slow command");
        }

        emit(terminal, &ctx, &out).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amp_bus::EventBus;
    use amp_bundle::fixture::FixtureBundleFactory;
    use amp_runtime::SessionManager;

    struct EchoHandler;

    #[async_trait]
    impl CommandHandler for EchoHandler {
        async fn handle(&self, command: &Command, _ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
            Ok(command.params.clone())
        }
    }

    struct StreamingHandler;

    #[async_trait]
    impl CommandHandler for StreamingHandler {
        fn is_streaming(&self) -> bool {
            true
        }

        async fn handle(&self, _command: &Command, _ctx: &HandlerContext, emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
            emit.send(TurnEvent::new("progress", json!({"pct": 50}))).await.ok();
            Ok(json!({"done": true}))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl CommandHandler for FailingHandler {
        async fn handle(&self, _command: &Command, _ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
            Err(ProtocolError::validation("nope"))
        }
    }

    fn ctx() -> Arc<HandlerContext> {
        Arc::new(HandlerContext::new(
            Arc::new(SessionManager::new(None, EventBus::new(), Arc::new(FixtureBundleFactory))),
            EventBus::new(),
        ))
    }

    async fn collect(out_rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(ev) = out_rx.recv().await {
            let is_final = ev.is_final;
            events.push(ev);
            if is_final {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn unknown_command_yields_terminal_error() {
        let dispatcher = Dispatcher::new();
        let (tx, mut rx) = mpsc::channel(8);
        dispatcher.dispatch(Command::new("c1", "no.such", json!({})), ctx(), tx).await;
        let events = collect(&mut rx).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data["code"], "UNKNOWN_COMMAND");
        assert!(events[0].is_final);
    }

    #[tokio::test]
    async fn non_streaming_command_has_no_ack() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("echo", EchoHandler);
        let (tx, mut rx) = mpsc::channel(8);
        dispatcher.dispatch(Command::new("c1", "echo", json!({"x": 1})), ctx(), tx).await;
        let events = collect(&mut rx).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "result");
        assert_eq!(events[0].data["x"], 1);
    }

    #[tokio::test]
    async fn streaming_command_emits_ack_then_progress_then_result() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("stream", StreamingHandler);
        let (tx, mut rx) = mpsc::channel(8);
        dispatcher.dispatch(Command::new("c1", "stream", json!({})), ctx(), tx).await;
        let events = collect(&mut rx).await;
        assert_eq!(events[0].event_type, "ack");
        assert_eq!(events[1].event_type, "progress");
        assert_eq!(events[2].event_type, "result");
        assert_eq!(events.iter().map(|e| e.sequence.unwrap()).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn handler_error_yields_terminal_error_event() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("fail", FailingHandler);
        let (tx, mut rx) = mpsc::channel(8);
        dispatcher.dispatch(Command::new("c1", "fail", json!({})), ctx(), tx).await;
        let events = collect(&mut rx).await;
        assert_eq!(events[0].event_type, "error");
        assert_eq!(events[0].data["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn every_dispatched_event_is_mirrored_onto_the_bus() {
        let bus = EventBus::new();
        let ctx = Arc::new(HandlerContext::new(
            Arc::new(SessionManager::new(None, EventBus::new(), Arc::new(FixtureBundleFactory))),
            bus.clone(),
        ));
        let seen = Arc::new(parking_lot::Mutex::new(0usize));
        let seen2 = seen.clone();
        let _sub = bus.subscribe_all(move |_| *seen2.lock() += 1);

        let mut dispatcher = Dispatcher::new();
        dispatcher.register("stream", StreamingHandler);
        let (tx, mut rx) = mpsc::channel(8);
        dispatcher.dispatch(Command::new("c1", "stream", json!({})), ctx, tx).await;
        collect(&mut rx).await;

        assert_eq!(*seen.lock(), 3); // ack, progress, result
    }

    #[test]
    fn commands_lists_sorted_registered_names() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("b.cmd", EchoHandler);
        dispatcher.register("a.cmd", EchoHandler);
        assert_eq!(dispatcher.commands(), vec!["a.cmd", "b.cmd"]);
    }
}
