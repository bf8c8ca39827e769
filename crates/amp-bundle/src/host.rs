//! The opaque external trait boundary: a bundle host owns the model and
//! tools and is driven purely by `execute`/`cancel`.

use async_trait::async_trait;
use serde_json::Value;
use std::pin::Pin;

use crate::event::BundleEvent;

pub type BundleEventStream = Pin<Box<dyn futures::Stream<Item = BundleEvent> + Send>>;

/// A running bundle: model + tools, scoped to one session.
#[async_trait]
pub trait BundleHost: Send + Sync {
    /// Run one turn against `prompt`, yielding execution events until the
    /// turn completes, errors, or is cancelled.
    async fn execute(&self, prompt: Value) -> BundleEventStream;

    /// Request cancellation of the in-flight `execute` call, if any.
    fn cancel(&self);

    /// The bundle's name, as reported to clients.
    fn name(&self) -> &str;
}

/// A request to construct a [`BundleHost`].
#[derive(Debug, Clone, Default)]
pub struct BundleDefinition {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub working_directory: Option<String>,
    pub behaviors: Vec<String>,
    pub inline: Option<Value>,
}

/// Constructs bundle hosts from a [`BundleDefinition`].
///
/// The real module loader is out of scope (see `SPEC_FULL.md` §1); this
/// trait is the seam a concrete implementation plugs into. [`crate::fixture::FixtureBundleFactory`]
/// is the only implementation shipped here, and it is never wired in as an
/// implicit fallback (see `DESIGN.md`, Open Question 4).
#[async_trait]
pub trait BundleFactory: Send + Sync {
    async fn create(
        &self,
        definition: &BundleDefinition,
    ) -> Result<std::sync::Arc<dyn BundleHost>, amp_protocol::ProtocolError>;
}
