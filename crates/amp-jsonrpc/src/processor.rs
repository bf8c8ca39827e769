//! Message-level framing on top of [`crate::handler::AcpHandler`], grounded
//! on `original_source/.../acp/transport.py`'s `JsonRpcProcessor`:
//! distinguish request from notification by presence of `id`, catch
//! protocol-shaped errors, and never let a panic-free handler failure crash
//! the connection.

use serde_json::Value;

use crate::handler::AcpHandler;
use crate::types::{self, JsonRpcError, JsonRpcResponse, from_protocol_error};

/// Parse one raw JSON-RPC message and, if it was a request, return the
/// response to send back. Notifications and malformed non-object input
/// produce no reply (a malformed message with a recoverable `id` still
/// gets an error response, per the JSON-RPC spec).
pub async fn process_message(handler: &AcpHandler, raw: &str) -> Option<JsonRpcResponse> {
    let parsed: Result<Value, _> = serde_json::from_str(raw);
    let value = match parsed {
        Ok(v) => v,
        Err(_) => {
            return Some(JsonRpcResponse::failure(
                Value::Null,
                JsonRpcError::new(types::PARSE_ERROR, "invalid JSON"),
            ));
        }
    };

    let id = value.get("id").cloned();
    let Some(method) = value.get("method").and_then(Value::as_str) else {
        return Some(JsonRpcResponse::failure(
            id.unwrap_or(Value::Null),
            JsonRpcError::new(types::INVALID_REQUEST, "missing `method`"),
        ));
    };
    let params = value.get("params").cloned().unwrap_or(Value::Null);

    match id {
        None => {
            handler.handle_notification(method, params).await;
            None
        }
        Some(id) => match handler.handle_request(method, params).await {
            Ok(result) => Some(JsonRpcResponse::success(id, result)),
            Err(err) => Some(JsonRpcResponse::failure(id, from_protocol_error(&err))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amp_bundle::fixture::FixtureBundleFactory;
    use amp_bus::EventBus;
    use amp_handler::HandlerContext;
    use amp_runtime::SessionManager;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn handler() -> AcpHandler {
        let ctx = Arc::new(HandlerContext::new(
            Arc::new(SessionManager::new(None, EventBus::new(), Arc::new(FixtureBundleFactory))),
            EventBus::new(),
        ));
        let (tx, _rx) = mpsc::channel(8);
        AcpHandler::new(ctx, tx)
    }

    #[tokio::test]
    async fn malformed_json_yields_parse_error() {
        let handler = handler();
        let resp = process_message(&handler, "{not json").await.unwrap();
        assert_eq!(resp.error.unwrap().code, types::PARSE_ERROR);
    }

    #[tokio::test]
    async fn missing_method_yields_invalid_request() {
        let handler = handler();
        let resp = process_message(&handler, r#"{"id":1,"params":{}}"#).await.unwrap();
        assert_eq!(resp.error.unwrap().code, types::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn notification_produces_no_response() {
        let handler = handler();
        let resp = process_message(&handler, r#"{"method":"session/cancel","params":{"sessionId":"x"}}"#).await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn request_round_trips_through_initialize() {
        let handler = handler();
        let resp = process_message(&handler, r#"{"id":7,"method":"initialize","params":{}}"#).await.unwrap();
        assert_eq!(resp.id, json!(7));
        assert!(resp.result.is_some());
    }
}
