//! WebSocket session lifecycle (`SPEC_FULL.md` §4.5.3).
//!
//! Grounded on `tron-server::websocket::session::run_ws_session`'s
//! split/forward/cleanup shape, but the message contract differs: the
//! teacher speaks its own RPC envelope over one logical request/response
//! pair per frame with session binding inferred from `session.create`
//! replies; this transport speaks the spec's `{type, payload, request_id?}`
//! envelope and multiplexes — each inbound frame is dispatched on its own
//! task so a slow `prompt.send` doesn't block a concurrent `ping`.

use std::sync::Arc;

use amp_handler::{Dispatcher, HandlerContext};
use amp_protocol::Command;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::{ConnectionRegistry, WsConnection};

#[derive(Deserialize)]
struct ClientMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    request_id: Option<String>,
}

fn server_message(kind: &str, payload: Value, request_id: Option<&str>) -> Value {
    json!({"type": kind, "payload": payload, "request_id": request_id})
}

/// Translate a client frame into the `(cmd, params)` a [`Dispatcher`]
/// understands. `None` means the frame was handled locally (`ping`).
fn to_command(msg: &ClientMessage) -> Option<(String, Value)> {
    match msg.kind.as_str() {
        "prompt" => Some(("prompt.send".to_string(), msg.payload.clone())),
        "abort" => Some(("prompt.cancel".to_string(), msg.payload.clone())),
        "approval" => Some(("approval.respond".to_string(), msg.payload.clone())),
        "command" => {
            let cmd = msg.payload.get("cmd").and_then(Value::as_str).unwrap_or_default().to_string();
            let params = msg.payload.get("params").cloned().unwrap_or(Value::Null);
            Some((cmd, params))
        }
        _ => None,
    }
}

/// Run one WebSocket connection from upgrade through disconnect.
///
/// `bound_session` is `Some` for `/ws/sessions/{id}` — every dispatched
/// command has `session_id` injected into its params so clients on the
/// scoped route don't have to repeat it.
pub async fn run_ws_session(
    ws: WebSocket,
    connection_id: String,
    dispatcher: Arc<Dispatcher>,
    ctx: Arc<HandlerContext>,
    registry: Arc<ConnectionRegistry>,
    bound_session: Option<String>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<String>(256);
    let connection = Arc::new(WsConnection::new(connection_id.clone(), send_tx));
    registry.add(connection.clone());

    let connected = server_message("connected", json!({"protocol_version": "1.0"}), None);
    if let Ok(text) = serde_json::to_string(&connected) {
        let _ = ws_tx.send(Message::Text(text.into())).await;
    }

    let outbound = tokio::spawn(async move {
        while let Some(msg) = send_rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => {
                connection.mark_alive();
                let Ok(client_msg) = serde_json::from_str::<ClientMessage>(&text) else {
                    connection.send_json(&server_message(
                        "error",
                        json!({"code": "PARSE_ERROR", "message": "malformed frame"}),
                        None,
                    ));
                    continue;
                };

                if client_msg.kind == "ping" {
                    connection.send_json(&server_message("pong", json!({}), client_msg.request_id.as_deref()));
                    continue;
                }

                let Some((cmd, mut params)) = to_command(&client_msg) else {
                    connection.send_json(&server_message(
                        "error",
                        json!({"code": "INVALID_REQUEST", "message": format!("unknown message type `{}`", client_msg.kind)}),
                        client_msg.request_id.as_deref(),
                    ));
                    continue;
                };

                if let (Some(session_id), Value::Object(ref mut map)) = (&bound_session, &mut params) {
                    map.entry("session_id").or_insert_with(|| json!(session_id));
                }

                let dispatcher = dispatcher.clone();
                let ctx = ctx.clone();
                let connection = connection.clone();
                let request_id = client_msg.request_id.clone();
                let cancel = connection.cancel.clone();

                let handle = tokio::spawn(async move {
                    let (tx, mut rx) = mpsc::channel(64);
                    let command = Command::new(request_id.clone().unwrap_or_default(), cmd, params);
                    let dispatch = dispatcher.dispatch(command, ctx, tx);
                    tokio::select! {
                        () = dispatch => {}
                        () = cancel.cancelled() => return,
                    }
                    while let Some(event) = rx.recv().await {
                        let kind = if event.event_type == "error" { "error" } else { "event" };
                        connection.send_json(&server_message(kind, json!(event), request_id.as_deref()));
                    }
                });
                in_flight.retain(|h| !h.is_finished());
                in_flight.push(handle);
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => connection.mark_alive(),
            Message::Binary(_) => {}
        }
    }

    // Disconnect or transport failure cancels all in-flight executions for
    // this connection. This stops the relay task above immediately; the
    // handler's own internally-spawned future (inside `Dispatcher::dispatch`)
    // is not forcibly killed — normal `JoinHandle`-drop semantics apply, so
    // it runs to completion but its result is discarded.
    connection.cancel.cancel();
    for handle in in_flight {
        handle.abort();
    }
    outbound.abort();
    registry.remove(&connection_id);
}
