//! Axum routes mounting the ACP adapter onto an HTTP listener
//! (`SPEC_FULL.md` §6: `POST /acp/rpc`, `GET /acp/events`, `WS /acp/ws`).
//!
//! `amp-transport-http`'s own router deliberately omits these — see its
//! `server.rs` header comment — so `amp-server` merges this crate's
//! [`router`] onto that one when `--acp` is passed. One [`AcpHandler`] is
//! shared across every request on the listener, matching the original
//! `HttpAcpTransport`'s single persistent `JsonRpcProcessor`; notifications
//! are fanned out to every `/acp/events` and `/acp/ws` listener through a
//! broadcast channel.

use std::convert::Infallible;
use std::sync::Arc;

use amp_handler::HandlerContext;
use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use crate::handler::AcpHandler;
use crate::processor::process_message;
use crate::types::JsonRpcNotification;

#[derive(Clone)]
struct AcpHttpState {
    handler: Arc<AcpHandler>,
    notifications: broadcast::Sender<JsonRpcNotification>,
}

/// Builds the three `/acp/*` routes as their own [`Router`], to be merged
/// onto the main HTTP router by `amp-server`.
#[must_use]
pub fn router(ctx: Arc<HandlerContext>) -> Router {
    let (notify_tx, notify_rx) = mpsc::channel(256);
    let (broadcast_tx, _) = broadcast::channel(256);
    let fanout = broadcast_tx.clone();
    tokio::spawn(async move {
        let mut rx = notify_rx;
        while let Some(note) = rx.recv().await {
            let _ = fanout.send(note);
        }
    });

    let state = AcpHttpState {
        handler: Arc::new(AcpHandler::new(ctx, notify_tx)),
        notifications: broadcast_tx,
    };

    Router::new()
        .route("/acp/rpc", post(rpc_handler))
        .route("/acp/events", get(events_handler))
        .route("/acp/ws", get(ws_upgrade_handler))
        .with_state(state)
}

async fn rpc_handler(State(state): State<AcpHttpState>, body: String) -> Response {
    match process_message(&state.handler, &body).await {
        Some(response) => axum::Json(response_to_value(&response)).into_response(),
        None => axum::http::StatusCode::ACCEPTED.into_response(),
    }
}

fn response_to_value(response: &crate::types::JsonRpcResponse) -> Value {
    serde_json::to_value(response).unwrap_or(Value::Null)
}

async fn events_handler(State(state): State<AcpHttpState>) -> impl IntoResponse {
    let mut rx = state.notifications.subscribe();
    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(note) => yield notification_to_sse(&note),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn notification_to_sse(note: &JsonRpcNotification) -> Result<SseEvent, Infallible> {
    Ok(SseEvent::default().data(serde_json::to_string(note).unwrap_or_default()))
}

async fn ws_upgrade_handler(ws: WebSocketUpgrade, State(state): State<AcpHttpState>) -> Response {
    ws.on_upgrade(move |socket| run_acp_ws(socket, state))
}

async fn run_acp_ws(mut socket: WebSocket, state: AcpHttpState) {
    let mut notifications = state.notifications.subscribe();
    loop {
        tokio::select! {
            incoming = socket.next() => {
                let Some(Ok(msg)) = incoming else { break };
                let Message::Text(text) = msg else { continue };
                if let Some(response) = process_message(&state.handler, &text).await {
                    let payload = serde_json::to_string(&response).unwrap_or_default();
                    if socket.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
            }
            note = notifications.recv() => {
                match note {
                    Ok(note) => {
                        let payload = serde_json::to_string(&note).unwrap_or_default();
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}
