//! Read-mostly metadata queries: `config.*`, `provider.*`, `bundle.*`,
//! `agents.*`, `tools.*`, `slash_commands.list` (§4.4).
//!
//! `agents`/`tools`/`slash_commands` surface whatever a concrete
//! `BundleHost` would expose; since the host implementation is out of
//! scope here, these consistently report an empty list rather than
//! fabricating content.

use amp_bundle::provider::{self, EnvSource, ProcessEnv};
use amp_protocol::{Command, ProtocolError};
use amp_runtime::TurnEvent;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::catalog::BundleCatalogEntry;
use crate::context::HandlerContext;
use crate::dispatch::CommandHandler;

pub struct ConfigGetHandler;

#[async_trait]
impl CommandHandler for ConfigGetHandler {
    async fn handle(&self, _command: &Command, ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        Ok(json!({
            "storage_dir": ctx.session_manager.storage_dir().map(|p| p.display().to_string()),
            "persist": ctx.session_manager.storage_dir().is_some(),
        }))
    }
}

pub struct ConfigInitHandler;

#[async_trait]
impl CommandHandler for ConfigInitHandler {
    async fn handle(&self, _command: &Command, _ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        Ok(json!({"initialized": true}))
    }
}

pub struct ProviderListHandler;

#[async_trait]
impl CommandHandler for ProviderListHandler {
    async fn handle(&self, _command: &Command, _ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        let providers: Vec<Value> = provider::all()
            .iter()
            .map(|p| json!({"name": p.as_str(), "env_var": p.env_var()}))
            .collect();
        Ok(json!({"providers": providers}))
    }
}

pub struct ProviderDetectHandler;

#[async_trait]
impl CommandHandler for ProviderDetectHandler {
    async fn handle(&self, _command: &Command, _ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        let detected = provider::default_provider(&ProcessEnv as &dyn EnvSource);
        Ok(json!({"detected": detected.map(provider::ProviderKind::as_str)}))
    }
}

pub struct BundleListHandler;

#[async_trait]
impl CommandHandler for BundleListHandler {
    async fn handle(&self, _command: &Command, ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        Ok(json!({"bundles": ctx.bundle_catalog.list()}))
    }
}

pub struct BundleInfoHandler;

#[async_trait]
impl CommandHandler for BundleInfoHandler {
    async fn handle(&self, command: &Command, ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        let name: String = command.required_param("name")?;
        ctx.bundle_catalog.info(&name)
    }
}

pub struct BundleAddHandler;

#[async_trait]
impl CommandHandler for BundleAddHandler {
    async fn handle(&self, command: &Command, ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        let name: String = command.required_param("name")?;
        let entry = BundleCatalogEntry {
            name,
            provider: command.param("provider").map_err(|e| ProtocolError::validation(e.to_string()))?,
            model: command.param("model").map_err(|e| ProtocolError::validation(e.to_string()))?,
        };
        ctx.bundle_catalog.add(entry)
    }
}

pub struct BundleRemoveHandler;

#[async_trait]
impl CommandHandler for BundleRemoveHandler {
    async fn handle(&self, command: &Command, ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        let name: String = command.required_param("name")?;
        ctx.bundle_catalog.remove(&name)?;
        Ok(json!({"removed": true, "name": name}))
    }
}

/// Streams two synthetic progress events (`downloading`, `verifying`) before
/// registering the bundle in the catalog. There is no real package fetch
/// behind this — the module loader it would drive is out of scope.
pub struct BundleInstallHandler;

#[async_trait]
impl CommandHandler for BundleInstallHandler {
    fn is_streaming(&self) -> bool {
        true
    }

    async fn handle(&self, command: &Command, ctx: &HandlerContext, emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        let name: String = command.required_param("name")?;
        for stage in ["downloading", "verifying"] {
            let _ = emit
                .send(TurnEvent::new("bundle.install.progress", json!({"name": name, "stage": stage})))
                .await;
        }
        let entry = BundleCatalogEntry {
            name: name.clone(),
            provider: command.param("provider").map_err(|e| ProtocolError::validation(e.to_string()))?,
            model: command.param("model").map_err(|e| ProtocolError::validation(e.to_string()))?,
        };
        ctx.bundle_catalog
            .add(entry)
            .map_err(|e| ProtocolError::BundleInstallError(e.to_string()))
    }
}

pub struct AgentsListHandler;

#[async_trait]
impl CommandHandler for AgentsListHandler {
    async fn handle(&self, _command: &Command, _ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        Ok(json!({"agents": []}))
    }
}

pub struct AgentInfoHandler;

#[async_trait]
impl CommandHandler for AgentInfoHandler {
    async fn handle(&self, command: &Command, _ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        let name: String = command.required_param("name")?;
        Err(ProtocolError::AgentNotFound(name))
    }
}

pub struct ToolsListHandler;

#[async_trait]
impl CommandHandler for ToolsListHandler {
    async fn handle(&self, _command: &Command, _ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        Ok(json!({"tools": []}))
    }
}

pub struct ToolInfoHandler;

#[async_trait]
impl CommandHandler for ToolInfoHandler {
    async fn handle(&self, command: &Command, _ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        let name: String = command.required_param("name")?;
        Err(ProtocolError::ToolNotFound(name))
    }
}

pub struct SlashCommandsListHandler;

#[async_trait]
impl CommandHandler for SlashCommandsListHandler {
    async fn handle(&self, _command: &Command, _ctx: &HandlerContext, _emit: mpsc::Sender<TurnEvent>) -> Result<Value, ProtocolError> {
        Ok(json!({"slash_commands": []}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use amp_bundle::fixture::FixtureBundleFactory;
    use amp_bus::EventBus;
    use amp_runtime::SessionManager;
    use std::sync::Arc;

    fn ctx() -> Arc<HandlerContext> {
        Arc::new(HandlerContext::new(
            Arc::new(SessionManager::new(None, EventBus::new(), Arc::new(FixtureBundleFactory))),
            EventBus::new(),
        ))
    }

    async fn run(dispatcher: &Dispatcher, cmd: &str, params: Value) -> Value {
        let (tx, mut rx) = mpsc::channel(8);
        dispatcher.dispatch(Command::new("c1", cmd, params), ctx(), tx).await;
        loop {
            let ev = rx.recv().await.unwrap();
            if ev.is_final {
                return ev.data;
            }
        }
    }

    #[tokio::test]
    async fn provider_list_returns_all_four() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("provider.list", ProviderListHandler);
        let data = run(&dispatcher, "provider.list", Value::Null).await;
        assert_eq!(data["providers"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn bundle_install_then_list_contains_it() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("bundle.install", BundleInstallHandler);
        dispatcher.register("bundle.list", BundleListHandler);
        let data = run(&dispatcher, "bundle.install", json!({"name": "custom"})).await;
        assert_eq!(data["name"], "custom");

        let ctx = ctx();
        ctx.bundle_catalog
            .add(BundleCatalogEntry { name: "installed-twice".into(), provider: None, model: None })
            .unwrap();
        assert!(ctx.bundle_catalog.info("installed-twice").is_ok());
    }

    #[tokio::test]
    async fn agent_info_unknown_name_is_not_found() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("agents.info", AgentInfoHandler);
        let (tx, mut rx) = mpsc::channel(8);
        dispatcher.dispatch(Command::new("c1", "agents.info", json!({"name": "x"})), ctx(), tx).await;
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.event_type, "error");
        assert_eq!(ev.data["code"], "AGENT_NOT_FOUND");
    }
}
