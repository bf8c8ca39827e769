//! Newline-delimited JSON transport over stdin/stdout (`SPEC_FULL.md` §4.5.1).
//!
//! Grounded on `original_source/.../transport/stdio.py` (line-oriented,
//! connect/disconnect, EOF-is-shutdown) and
//! `original_source/.../transport/stdio_adapter.py` (the protocol framing on
//! top of it: one command per stdin line, one event per stdout line, errors
//! to stderr, an unsolicited `connected` event on start). Tokio's
//! [`tokio::io::stdin`]/[`tokio::io::stdout`] handles are already raw byte
//! streams on every platform, so unlike the Python original there is no
//! separate step to force the handles into binary mode.

#![deny(unsafe_code)]

use std::sync::Arc;

use amp_handler::{Dispatcher, HandlerContext};
use amp_protocol::{Command, Event};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Runs the stdio transport until stdin reaches EOF.
///
/// `input`/`output` are generic over `AsyncRead`/`AsyncWrite` so tests can
/// drive this against in-memory pipes instead of the real process streams.
pub struct StdioTransport {
    dispatcher: Arc<Dispatcher>,
    ctx: Arc<HandlerContext>,
}

impl StdioTransport {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, ctx: Arc<HandlerContext>) -> Self {
        Self { dispatcher, ctx }
    }

    /// Run against the real process stdin/stdout. Blocks until stdin closes.
    pub async fn run(&self) -> std::io::Result<()> {
        self.run_on(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Run against arbitrary streams (used by tests and embedders).
    pub async fn run_on<R, W>(&self, input: R, mut output: W) -> std::io::Result<()>
    where
        R: tokio::io::AsyncRead + Unpin,
        W: tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<Event>(256);

        let writer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Ok(mut line) = serde_json::to_string(&event) else {
                    continue;
                };
                line.push('\n');
                if output.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if output.flush().await.is_err() {
                    break;
                }
            }
        });

        let _ = tx.send(Event::uncorrelated("connected", json!({"transport": "stdio"}))).await;

        let mut lines = BufReader::new(input).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break, // EOF: graceful shutdown
                Err(err) => {
                    warn!(%err, "stdin read error");
                    break;
                }
            };
            let line = line.strip_prefix('\u{feff}').unwrap_or(&line).trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<Command>(line) {
                Ok(command) => {
                    debug!(cmd = %command.cmd, id = %command.id, "received command");
                    self.dispatcher.dispatch(command, self.ctx.clone(), tx.clone()).await;
                }
                Err(err) => {
                    let body = amp_protocol::ProtocolError::Parse(err.to_string()).to_body();
                    let _ = tx.send(Event::uncorrelated("error", json!(body))).await;
                }
            }
        }

        drop(tx);
        let _ = writer.await;
        Ok(())
    }
}
