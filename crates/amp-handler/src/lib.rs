//! Command handlers and dispatch envelope: the layer that turns an
//! `amp_protocol::Command` into a sequenced `ack`/intermediate/`result`
//! stream of `amp_protocol::Event`s, driven against an `amp_runtime::Session`.
//!
//! Grounded on `tron-server`'s `rpc` module: `dispatch` is this crate's
//! `MethodRegistry`, `context` its `RpcContext`, narrowed to what a session
//! actually needs since the LLM/tool surface lives behind `BundleHost`.

#![deny(unsafe_code)]

pub mod catalog;
pub mod context;
pub mod dispatch;
pub mod handlers;

pub use catalog::{BundleCatalog, BundleCatalogEntry};
pub use context::HandlerContext;
pub use dispatch::{CommandHandler, Dispatcher};

use handlers::{approval, metadata, prompt, session, system};

/// Registers every known command against its handler, in the order
/// `SPEC_FULL.md` §4.4 lists them, with `capabilities` registered last so it
/// can report the full command surface including its own name.
pub fn register_all(dispatcher: &mut Dispatcher) {
    dispatcher.register("ping", system::PingHandler);

    dispatcher.register("session.create", session::CreateSessionHandler);
    dispatcher.register("session.get", session::SessionInfoHandler);
    dispatcher.register("session.info", session::SessionInfoHandler);
    dispatcher.register("session.list", session::ListSessionsHandler);
    dispatcher.register("session.delete", session::DeleteSessionHandler);
    dispatcher.register("session.reset", session::ResetSessionHandler);

    dispatcher.register("prompt.send", prompt::PromptSendHandler);
    dispatcher.register("prompt.cancel", prompt::PromptCancelHandler);

    dispatcher.register("approval.respond", approval::ApprovalRespondHandler);

    dispatcher.register("config.get", metadata::ConfigGetHandler);
    dispatcher.register("config.init", metadata::ConfigInitHandler);
    dispatcher.register("provider.list", metadata::ProviderListHandler);
    dispatcher.register("provider.detect", metadata::ProviderDetectHandler);
    dispatcher.register("bundle.list", metadata::BundleListHandler);
    dispatcher.register("bundle.info", metadata::BundleInfoHandler);
    dispatcher.register("bundle.add", metadata::BundleAddHandler);
    dispatcher.register("bundle.remove", metadata::BundleRemoveHandler);
    dispatcher.register("bundle.install", metadata::BundleInstallHandler);
    dispatcher.register("agents.list", metadata::AgentsListHandler);
    dispatcher.register("agents.info", metadata::AgentInfoHandler);
    dispatcher.register("tools.list", metadata::ToolsListHandler);
    dispatcher.register("tools.info", metadata::ToolInfoHandler);
    dispatcher.register("slash_commands.list", metadata::SlashCommandsListHandler);

    let commands = dispatcher.commands();
    dispatcher.register("capabilities", system::CapabilitiesHandler::new(commands));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_all_includes_capabilities_and_every_command() {
        let mut dispatcher = Dispatcher::new();
        register_all(&mut dispatcher);
        assert!(dispatcher.has_command("capabilities"));
        assert!(dispatcher.has_command("ping"));
        assert!(dispatcher.has_command("session.create"));
        assert!(dispatcher.has_command("bundle.install"));
        assert!(dispatcher.commands().len() >= 20);
    }
}
