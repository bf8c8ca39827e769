//! `HttpServer` — Axum HTTP + SSE + WebSocket server (`SPEC_FULL.md` §4.5.2,
//! §4.5.3, §6). Router/layer shape and `listen()` are grounded on
//! `tron-server::server::TronServer`; the route table itself comes from
//! `SPEC_FULL.md` §6 rather than the teacher's `/health`+`/metrics`+`/ws`
//! surface. `/acp/*` is deliberately absent — it is mounted by `amp-server`
//! once `amp-jsonrpc` supplies it, merged onto this router's output.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use amp_handler::{Dispatcher, HandlerContext};
use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::config::HttpConfig;
use crate::connection::ConnectionRegistry;
use crate::once::dispatch_once;
use crate::shutdown::ShutdownCoordinator;
use crate::sse;
use crate::ws::run_ws_session;

#[derive(Clone)]
struct UuidV7RequestId;

impl MakeRequestId for UuidV7RequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::now_v7().to_string();
        axum::http::HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub ctx: Arc<HandlerContext>,
    pub connections: Arc<ConnectionRegistry>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub start_time: Instant,
    pub config: HttpConfig,
}

pub struct HttpServer {
    config: HttpConfig,
    dispatcher: Arc<Dispatcher>,
    ctx: Arc<HandlerContext>,
    connections: Arc<ConnectionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl HttpServer {
    #[must_use]
    pub fn new(config: HttpConfig, dispatcher: Dispatcher, ctx: Arc<HandlerContext>) -> Self {
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            ctx,
            connections: Arc::new(ConnectionRegistry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    #[must_use]
    pub fn router(&self) -> Router {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
            ctx: self.ctx.clone(),
            connections: self.connections.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            config: self.config.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/ping", get(ping_handler))
            .route("/capabilities", get(capabilities_handler))
            .route("/event", get(event_handler))
            .route("/session", get(session_list_handler).post(session_create_handler))
            .route("/session/{id}", get(session_get_handler).delete(session_delete_handler))
            .route("/session/{id}/prompt", post(session_prompt_handler))
            .route("/session/{id}/cancel", post(session_cancel_handler))
            .route("/session/{id}/approval", post(session_approval_handler))
            .route("/ws", get(ws_upgrade_handler))
            .route("/ws/sessions/{id}", get(ws_scoped_upgrade_handler))
            .with_state(state)
            // Outermost layers execute first on request, last on response.
            .layer(CatchPanicLayer::new())
            .layer(CompressionLayer::new())
            .layer(RequestBodyLimitLayer::new(1024 * 1024))
            .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(30)))
            .layer(SetRequestIdLayer::x_request_id(UuidV7RequestId))
            .layer(PropagateRequestIdLayer::x_request_id())
    }

    pub async fn listen(&self) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let bound_addr = listener.local_addr()?;
        info!(addr = %bound_addr, "http transport started");

        let router = self.router();
        let shutdown_token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_token.cancelled().await;
                    info!("http transport shutdown initiated");
                })
                .await;
            info!("http transport shutdown complete");
        });

        Ok((bound_addr, handle))
    }

    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    #[must_use]
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    connections: usize,
    active_sessions: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        connections: state.connections.count(),
        active_sessions: state.ctx.session_manager.active_count(),
    })
}

async fn ping_handler(State(state): State<AppState>) -> Response {
    dispatch_once(&state.dispatcher, state.ctx, "ping", json!({})).await
}

async fn capabilities_handler(State(state): State<AppState>) -> Response {
    dispatch_once(&state.dispatcher, state.ctx, "capabilities", json!({})).await
}

async fn event_handler(State(state): State<AppState>) -> impl IntoResponse {
    sse::event_stream(state.ctx.bus.clone())
}

async fn session_list_handler(State(state): State<AppState>, Query(query): Query<HashMap<String, String>>) -> Response {
    let params = json!({"cwd": query.get("cwd").cloned().unwrap_or_default()});
    dispatch_once(&state.dispatcher, state.ctx, "session.list", params).await
}

async fn session_create_handler(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    dispatch_once(&state.dispatcher, state.ctx, "session.create", body).await
}

async fn session_get_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    dispatch_once(&state.dispatcher, state.ctx, "session.get", json!({"session_id": id})).await
}

async fn session_delete_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let params = json!({"session_id": id, "cwd": query.get("cwd").cloned().unwrap_or_default()});
    dispatch_once(&state.dispatcher, state.ctx, "session.delete", params).await
}

async fn session_prompt_handler(State(state): State<AppState>, Path(id): Path<String>, Json(body): Json<Value>) -> impl IntoResponse {
    sse::prompt_stream(state.dispatcher, state.ctx, id, body)
}

async fn session_cancel_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    dispatch_once(&state.dispatcher, state.ctx, "prompt.cancel", json!({"session_id": id})).await
}

async fn session_approval_handler(State(state): State<AppState>, Path(id): Path<String>, Json(mut body): Json<Value>) -> Response {
    if let Value::Object(ref mut map) = body {
        map.entry("session_id").or_insert_with(|| json!(id));
    }
    dispatch_once(&state.dispatcher, state.ctx, "approval.respond", body).await
}

async fn ws_upgrade_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Result<Response, StatusCode> {
    upgrade(ws, state, None).await
}

async fn ws_scoped_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, StatusCode> {
    upgrade(ws, state, Some(id)).await
}

async fn upgrade(ws: WebSocketUpgrade, state: AppState, bound_session: Option<String>) -> Result<Response, StatusCode> {
    if state.connections.count() >= state.config.max_connections {
        tracing::warn!(max = state.config.max_connections, "connection limit reached, rejecting WebSocket upgrade");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let connection_id = uuid::Uuid::now_v7().to_string();
    let dispatcher = state.dispatcher;
    let ctx = state.ctx;
    let connections = state.connections;
    let max_message_size = state.config.max_message_size;

    Ok(ws
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, connection_id, dispatcher, ctx, connections, bound_session))
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use amp_bundle::fixture::FixtureBundleFactory;
    use amp_bus::EventBus;
    use amp_runtime::SessionManager;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn make_server() -> HttpServer {
        let ctx = Arc::new(HandlerContext::new(
            Arc::new(SessionManager::new(None, EventBus::new(), Arc::new(FixtureBundleFactory))),
            EventBus::new(),
        ));
        let mut dispatcher = Dispatcher::new();
        amp_handler::register_all(&mut dispatcher);
        HttpServer::new(HttpConfig::default(), dispatcher, ctx)
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
    }

    #[tokio::test]
    async fn ping_endpoint_dispatches_through_the_registry() {
        let app = make_server().router();
        let req = Request::builder().uri("/ping").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_endpoint_requires_upgrade() {
        let app = make_server().router();
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_ne!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn session_get_missing_returns_404() {
        let app = make_server().router();
        let req = Request::builder().uri("/session/missing").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn server_listen_binds_port() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.shutdown().shutdown();
        let _ = handle.await;
    }
}
