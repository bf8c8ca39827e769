//! Non-streaming request/response bridge from a single dispatched
//! [`Command`] to an Axum response — used by every REST endpoint that isn't
//! SSE (`SPEC_FULL.md` §6's "no streaming" rows).

use std::sync::Arc;

use amp_handler::{Dispatcher, HandlerContext};
use amp_protocol::Command;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tokio::sync::mpsc;

/// Maps a wire error code back to an HTTP status, mirroring
/// `amp_protocol::ProtocolError::http_status`'s table by code string since
/// only the serialized body, not the original enum, survives dispatch.
fn status_for_code(code: &str) -> StatusCode {
    match code {
        "PARSE_ERROR" | "INVALID_REQUEST" | "UNKNOWN_COMMAND" | "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
        "SESSION_NOT_FOUND" | "APPROVAL_NOT_FOUND" | "TOOL_NOT_FOUND" | "AGENT_NOT_FOUND" | "BUNDLE_NOT_FOUND" => {
            StatusCode::NOT_FOUND
        }
        "timeout" => StatusCode::REQUEST_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Dispatch `cmd` with `params`, drain its event channel, and turn the
/// terminal event into a JSON response with the matching status code.
pub async fn dispatch_once(dispatcher: &Dispatcher, ctx: Arc<HandlerContext>, cmd: &str, params: Value) -> Response {
    let (tx, mut rx) = mpsc::channel(64);
    let command = Command::with_new_id(cmd, params);
    dispatcher.dispatch(command, ctx, tx).await;

    let mut terminal = None;
    while let Some(event) = rx.recv().await {
        if event.is_final {
            terminal = Some(event);
            break;
        }
    }

    match terminal {
        Some(event) if event.event_type == "error" => {
            let status = status_for_code(event.data.get("code").and_then(Value::as_str).unwrap_or(""));
            (status, Json(event.data)).into_response()
        }
        Some(event) => (StatusCode::OK, Json(event.data)).into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
