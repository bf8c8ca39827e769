//! # amp-server
//!
//! Agent runtime server binary: CLI parsing, transport wiring, and process
//! bootstrap. Grounded on `tron-agent`'s `main.rs` (bootstrap ordering,
//! `Cli`/`clap::Parser` shape, final listen/ctrl-c/shutdown sequence) and
//! `amp-transport-http::server`'s own doc comment, which states that
//! `/acp/*` is deliberately left out of its router for this binary to merge
//! in once `--acp` is passed.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use amp_bundle::DefaultBundleFactory;
use amp_bus::EventBus;
use amp_handler::{Dispatcher, HandlerContext};
use amp_runtime::SessionManager;
use amp_transport_http::{HttpConfig, HttpServer};
use amp_transport_stdio::StdioTransport;

/// Agent runtime server: mediates between editor clients and bundle hosts
/// over stdio, HTTP/SSE, WebSocket, or JSON-RPC (ACP).
#[derive(Parser, Debug)]
#[command(name = "amp-server", about = "Agent runtime server")]
struct Cli {
    /// Serve over HTTP/SSE/WebSocket instead of stdio.
    #[arg(long)]
    http: bool,

    /// Host to bind when `--http` is set.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind when `--http` is set (0 for auto-assign).
    #[arg(long, default_value_t = 0)]
    port: u16,

    /// Accepted for compatibility; this build has no hot-reload support.
    #[arg(long)]
    reload: bool,

    /// Mount the ACP JSON-RPC surface (`/acp/rpc`, `/acp/events`, `/acp/ws`).
    /// Requires `--http`.
    #[arg(long)]
    acp: bool,

    /// Directory for persisted session history.
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Disable session persistence entirely (in-memory only).
    #[arg(long)]
    no_persist: bool,

    /// Check that a running server is reachable, then exit instead of
    /// starting a new one. Exit 0 if reachable, 1 otherwise.
    #[arg(long)]
    health: bool,

    /// URL to probe for `--health` (defaults to `http://<host>:<port>/health`).
    #[arg(long)]
    health_url: Option<String>,
}

impl Cli {
    fn storage_dir(&self) -> Option<PathBuf> {
        if self.no_persist || std::env::var("AMPLIFIER_NO_PERSIST").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return None;
        }
        self.storage_dir
            .clone()
            .or_else(|| std::env::var_os("AMPLIFIER_STORAGE_DIR").map(PathBuf::from))
    }

    fn health_url(&self) -> String {
        self.health_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}/health", self.host, self.port))
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

/// Probes `url`, printing the outcome and returning the process exit code
/// (`SPEC_FULL.md` §6: 0 reachable, 1 connection error).
async fn run_health_check(url: &str) -> i32 {
    match reqwest::get(url).await {
        Ok(resp) if resp.status().is_success() => {
            println!("ok: {url} is reachable ({})", resp.status());
            0
        }
        Ok(resp) => {
            eprintln!("error: {url} responded with {}", resp.status());
            1
        }
        Err(err) => {
            eprintln!("error: {url} unreachable: {err}");
            1
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.health {
        std::process::exit(run_health_check(&cli.health_url()).await);
    }

    if cli.acp && !cli.http {
        eprintln!("error: --acp requires --http");
        std::process::exit(2);
    }

    init_tracing();

    if cli.reload {
        tracing::warn!("--reload was passed but this build has no hot-reload support; ignoring");
    }

    let bus = EventBus::new();
    let bundle_factory: Arc<dyn amp_bundle::BundleFactory> = Arc::new(DefaultBundleFactory::default());
    let session_manager = Arc::new(SessionManager::new(cli.storage_dir(), bus.clone(), bundle_factory));
    let ctx = Arc::new(HandlerContext::new(session_manager, bus));

    let mut dispatcher = Dispatcher::new();
    amp_handler::register_all(&mut dispatcher);

    if !cli.http {
        tracing::info!("amp-server listening on stdio");
        let transport = StdioTransport::new(Arc::new(dispatcher), ctx);
        transport.run().await.context("stdio transport failed")?;
        tracing::info!("stdin closed, shutting down");
        return Ok(());
    }

    let config = HttpConfig {
        host: cli.host.clone(),
        port: cli.port,
        ..HttpConfig::default()
    };
    let http_server = HttpServer::new(config, dispatcher, ctx.clone());

    let router = if cli.acp {
        http_server.router().merge(amp_jsonrpc::router(ctx))
    } else {
        http_server.router()
    };

    let addr = format!("{}:{}", http_server.config().host, http_server.config().port);
    let listener = tokio::net::TcpListener::bind(&addr).await.context("failed to bind HTTP listener")?;
    let bound_addr = listener.local_addr().context("failed to read bound address")?;
    tracing::info!(acp = cli.acp, "amp-server listening on http://{bound_addr}");

    let shutdown_token = http_server.shutdown().token();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            })
            .await;
    });

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down...");
    http_server.shutdown().shutdown();
    let _ = handle.await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_http_config() {
        let cli = Cli::parse_from(["amp-server"]);
        assert!(!cli.http);
        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.port, 0);
        assert!(!cli.acp);
    }

    #[test]
    fn storage_dir_honors_explicit_flag() {
        let cli = Cli::parse_from(["amp-server", "--storage-dir", "/tmp/sessions"]);
        assert_eq!(cli.storage_dir(), Some(PathBuf::from("/tmp/sessions")));
    }

    #[test]
    fn no_persist_flag_overrides_storage_dir() {
        let cli = Cli::parse_from(["amp-server", "--storage-dir", "/tmp/sessions", "--no-persist"]);
        assert_eq!(cli.storage_dir(), None);
    }

    #[test]
    fn health_url_defaults_from_host_and_port() {
        let cli = Cli::parse_from(["amp-server", "--host", "0.0.0.0", "--port", "9000"]);
        assert_eq!(cli.health_url(), "http://0.0.0.0:9000/health");
    }

    #[test]
    fn explicit_health_url_overrides_derived_one() {
        let cli = Cli::parse_from(["amp-server", "--health-url", "http://example.test/health"]);
        assert_eq!(cli.health_url(), "http://example.test/health");
    }
}
