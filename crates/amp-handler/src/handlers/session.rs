//! `session.create/get/info/list/delete/reset`.

use amp_bundle::BundleDefinition;
use amp_protocol::{Command, ProtocolError};
use amp_runtime::TurnEvent;
use amp_store::SessionFilter;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::context::HandlerContext;
use crate::dispatch::CommandHandler;
use crate::handlers::lookup_session;

fn definition_from_params(command: &Command) -> Result<BundleDefinition, ProtocolError> {
    if let Some(inline) = command
        .param::<Value>("bundle_definition")
        .map_err(|e| ProtocolError::validation(format!("invalid `bundle_definition`: {e}")))?
    {
        return Ok(BundleDefinition {
            name: inline.get("name").and_then(Value::as_str).map(str::to_string),
            provider: inline.get("provider").and_then(Value::as_str).map(str::to_string),
            model: inline.get("model").and_then(Value::as_str).map(str::to_string),
            working_directory: inline.get("working_directory").and_then(Value::as_str).map(str::to_string),
            behaviors: inline
                .get("behaviors")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
            inline: Some(inline),
        });
    }
    Ok(BundleDefinition {
        name: command.param("bundle").map_err(|e| ProtocolError::validation(e.to_string()))?,
        provider: command.param("provider").map_err(|e| ProtocolError::validation(e.to_string()))?,
        model: command.param("model").map_err(|e| ProtocolError::validation(e.to_string()))?,
        working_directory: command
            .param("working_directory")
            .map_err(|e| ProtocolError::validation(e.to_string()))?,
        behaviors: command
            .param("behaviors")
            .map_err(|e| ProtocolError::validation(e.to_string()))?
            .unwrap_or_default(),
        inline: None,
    })
}

pub struct CreateSessionHandler;

#[async_trait]
impl CommandHandler for CreateSessionHandler {
    async fn handle(&self, command: &Command, ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        let definition = definition_from_params(command)?;
        let cwd = definition.working_directory.clone().unwrap_or_default();
        let session = ctx
            .session_manager
            .create_session(&cwd, definition)
            .await
            .map_err(|e| ProtocolError::BundleError(e.to_string()))?;
        Ok(json!({
            "session_id": session.session_id,
            "state": session.state().as_str(),
            "bundle": session.metadata().bundle,
        }))
    }
}

/// Backs both `session.get` and `session.info` — both are plain metadata
/// reads over the same session state (§4.4).
pub struct SessionInfoHandler;

#[async_trait]
impl CommandHandler for SessionInfoHandler {
    async fn handle(&self, command: &Command, ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        let session = lookup_session(ctx, command).await?;
        let metadata = session.metadata();
        Ok(json!({
            "session_id": session.session_id,
            "state": session.state().as_str(),
            "metadata": metadata,
            "message_count": session.transcript().len(),
        }))
    }
}

pub struct ListSessionsHandler;

#[async_trait]
impl CommandHandler for ListSessionsHandler {
    async fn handle(&self, command: &Command, ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        let cwd: String = command
            .required_param("cwd")
            .map_err(|_| ProtocolError::validation("missing required `cwd`"))?;
        let filter = SessionFilter {
            top_level_only: command.param("top_level_only").unwrap_or(None).unwrap_or(false),
            min_turns: command.param("min_turns").unwrap_or(None),
            state: command.param("state").unwrap_or(None),
            limit: command.param("limit").unwrap_or(None),
        };
        let sessions = ctx.session_manager.list_sessions(&cwd, &filter).await?;
        Ok(json!({"sessions": sessions.into_iter().map(|s| json!({"session_id": s.session_id, "metadata": s.metadata})).collect::<Vec<_>>()}))
    }
}

pub struct DeleteSessionHandler;

#[async_trait]
impl CommandHandler for DeleteSessionHandler {
    async fn handle(&self, command: &Command, ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        let session_id: String = command.required_param("session_id")?;
        let cwd: String = command.param("cwd").unwrap_or(None).unwrap_or_default();
        ctx.session_manager.delete_session(&cwd, &session_id).await?;
        Ok(json!({"deleted": true, "session_id": session_id}))
    }
}

pub struct ResetSessionHandler;

#[async_trait]
impl CommandHandler for ResetSessionHandler {
    fn is_streaming(&self) -> bool {
        true
    }

    async fn handle(&self, command: &Command, ctx: &HandlerContext, emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        let session = lookup_session(ctx, command).await?;
        let preserve_history: bool = command.param("preserve_history").unwrap_or(None).unwrap_or(false);
        let definition = if command.params.get("bundle").is_some() {
            Some(definition_from_params(command)?)
        } else {
            None
        };

        let _ = emit
            .send(TurnEvent::new("session.reset.started", json!({"session_id": session.session_id})))
            .await;
        session
            .reset(ctx.session_manager.bundle_factory().as_ref(), definition.as_ref(), preserve_history)
            .await?;
        let _ = emit
            .send(TurnEvent::new("session.reset.completed", json!({"session_id": session.session_id})))
            .await;
        Ok(json!({"session_id": session.session_id, "state": session.state().as_str()}))
    }
}
