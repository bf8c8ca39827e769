//! `approval.respond`.

use amp_protocol::{Command, ProtocolError};
use amp_runtime::TurnEvent;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::context::HandlerContext;
use crate::dispatch::CommandHandler;
use crate::handlers::lookup_session;

pub struct ApprovalRespondHandler;

#[async_trait]
impl CommandHandler for ApprovalRespondHandler {
    async fn handle(&self, command: &Command, ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        let session = lookup_session(ctx, command).await?;
        let request_id: String = command.required_param("request_id")?;
        let choice: String = command.required_param("choice")?;
        if session.approvals.handle_response(&request_id, &choice) {
            Ok(json!({"resolved": true, "request_id": request_id}))
        } else {
            Err(ProtocolError::ApprovalNotFound(request_id))
        }
    }
}
