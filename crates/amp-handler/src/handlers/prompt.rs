//! `prompt.send` / `prompt.cancel`.

use amp_protocol::{Command, ProtocolError};
use amp_runtime::TurnEvent;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::context::HandlerContext;
use crate::dispatch::CommandHandler;
use crate::handlers::lookup_session;

pub struct PromptSendHandler;

#[async_trait]
impl CommandHandler for PromptSendHandler {
    fn is_streaming(&self) -> bool {
        true
    }

    async fn handle(&self, command: &Command, ctx: &HandlerContext, emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        let session = lookup_session(ctx, command).await?;
        let content: Value = command.required_param("content")?;
        session.execute(content, emit).await?;
        Ok(json!({
            "session_id": session.session_id,
            "state": session.state().as_str(),
            "turn": session.metadata().turn_count,
        }))
    }
}

pub struct PromptCancelHandler;

#[async_trait]
impl CommandHandler for PromptCancelHandler {
    async fn handle(&self, command: &Command, ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        let session = lookup_session(ctx, command).await?;
        session.cancel();
        Ok(json!({"cancelled": true, "session_id": session.session_id}))
    }
}
