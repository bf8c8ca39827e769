//! Server-Sent Events endpoints (`SPEC_FULL.md` §4.5.2).
//!
//! The heartbeat/disconnect-detection shape is grounded on
//! `original_source/.../transport/sse.py`'s `sse_response`: an initial
//! `connected` event, a periodic heartbeat interleaved with real events via
//! a single select loop, and reliance on the response body's own
//! cancellation to detect a dropped client (Axum's `Sse` stops polling the
//! underlying stream when the connection closes, the same role Starlette's
//! `request.is_disconnected()` poll played in the original).

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use amp_bus::EventBus;
use amp_handler::{Dispatcher, HandlerContext};
use amp_protocol::Command;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::Stream;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

fn to_sse(value: &serde_json::Value) -> Result<SseEvent, Infallible> {
    Ok(SseEvent::default().data(serde_json::to_string(value).unwrap_or_default()))
}

/// `GET /event` — every event published on the bus, uncorrelated to any one
/// command, plus a `server.heartbeat` every 30 seconds.
pub fn event_stream(bus: EventBus) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = async_stream::stream! {
        yield to_sse(&json!({"type": "server.connected", "properties": {}}));

        let mut bus_stream = bus.stream();
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await; // consume the immediate first tick; first real heartbeat fires after 30s

        loop {
            tokio::select! {
                event = bus_stream.next() => {
                    match event {
                        Some(event) => yield to_sse(&json!(event)),
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    yield to_sse(&json!({"type": "server.heartbeat", "properties": {}}));
                }
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// `POST /session/{id}/prompt` — streams the `ack`/intermediate/terminal
/// envelope of one `prompt.send` dispatch, ending on its `final` event.
pub fn prompt_stream(
    dispatcher: Arc<Dispatcher>,
    ctx: Arc<HandlerContext>,
    session_id: String,
    mut params: serde_json::Value,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    if let serde_json::Value::Object(ref mut map) = params {
        map.entry("session_id").or_insert_with(|| json!(session_id));
    } else {
        params = json!({"session_id": session_id});
    }

    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(async move {
        let command = Command::with_new_id("prompt.send", params);
        dispatcher.dispatch(command, ctx, tx).await;
    });

    let stream = ReceiverStream::new(rx).map(|event| to_sse(&json!(event)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}
