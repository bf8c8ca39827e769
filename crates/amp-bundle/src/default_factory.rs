//! The production [`BundleFactory`] wiring a binary reaches for by default.
//!
//! Grounded on Open Question 4 (`DESIGN.md`): the in-memory fixture is never
//! an implicit fallback. This factory only builds the fixture host when the
//! caller explicitly opts in — `AMPLIFIER_BUNDLE=fixture`, a definition named
//! `"fixture"`, or a `behaviors` entry asking for it — and otherwise fails
//! with `BUNDLE_ERROR` even if a provider key is present, since no
//! provider-backed host ships in this rewrite (`host.rs`'s module doc: "the
//! real module loader is out of scope").

use async_trait::async_trait;
use std::sync::Arc;

use crate::fixture::FixtureBundleFactory;
use crate::host::{BundleDefinition, BundleFactory, BundleHost};
use crate::provider::{EnvSource, ProcessEnv, default_provider};

fn wants_fixture(definition: &BundleDefinition, env: &dyn EnvSource) -> bool {
    if definition.name.as_deref() == Some("fixture") {
        return true;
    }
    if definition.behaviors.iter().any(|b| b == "fixture") {
        return true;
    }
    env.get("AMPLIFIER_BUNDLE").as_deref() == Some("fixture")
}

/// Delegates to [`FixtureBundleFactory`] only on explicit opt-in; otherwise
/// reports `BUNDLE_ERROR`, naming whichever provider env vars it checked.
pub struct DefaultBundleFactory {
    env: Box<dyn EnvSource + Send + Sync>,
}

impl Default for DefaultBundleFactory {
    fn default() -> Self {
        Self { env: Box::new(ProcessEnv) }
    }
}

impl DefaultBundleFactory {
    #[must_use]
    pub fn new(env: Box<dyn EnvSource + Send + Sync>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl BundleFactory for DefaultBundleFactory {
    async fn create(&self, definition: &BundleDefinition) -> Result<Arc<dyn BundleHost>, amp_protocol::ProtocolError> {
        if wants_fixture(definition, self.env.as_ref()) {
            return FixtureBundleFactory.create(definition).await;
        }
        if default_provider(self.env.as_ref()).is_some() {
            return Err(amp_protocol::ProtocolError::BundleError(
                "a provider key is configured but no provider-backed bundle host is available in this build; set AMPLIFIER_BUNDLE=fixture to use the in-memory fixture".to_string(),
            ));
        }
        Err(amp_protocol::ProtocolError::BundleError(
            "no provider configured (set ANTHROPIC_API_KEY, OPENAI_API_KEY, AZURE_OPENAI_API_KEY, or GOOGLE_API_KEY) and no bundle fixture requested (set AMPLIFIER_BUNDLE=fixture)".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapEnv(HashMap<&'static str, &'static str>);

    impl EnvSource for MapEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key).map(|s| (*s).to_string())
        }
    }

    #[tokio::test]
    async fn no_env_and_no_opt_in_fails_with_bundle_error() {
        let factory = DefaultBundleFactory::new(Box::new(MapEnv(HashMap::new())));
        let err = factory.create(&BundleDefinition::default()).await.unwrap_err();
        assert_eq!(err.code(), "BUNDLE_ERROR");
    }

    #[tokio::test]
    async fn provider_key_present_without_fixture_still_fails() {
        let env = MapEnv(HashMap::from([("ANTHROPIC_API_KEY", "sk-x")]));
        let factory = DefaultBundleFactory::new(Box::new(env));
        let err = factory.create(&BundleDefinition::default()).await.unwrap_err();
        assert_eq!(err.code(), "BUNDLE_ERROR");
    }

    #[tokio::test]
    async fn explicit_fixture_name_opts_in() {
        let factory = DefaultBundleFactory::new(Box::new(MapEnv(HashMap::new())));
        let definition = BundleDefinition {
            name: Some("fixture".to_string()),
            ..Default::default()
        };
        let host = factory.create(&definition).await.unwrap();
        assert_eq!(host.name(), "fixture");
    }

    #[tokio::test]
    async fn env_var_opts_in() {
        let env = MapEnv(HashMap::from([("AMPLIFIER_BUNDLE", "fixture")]));
        let factory = DefaultBundleFactory::new(Box::new(env));
        let host = factory.create(&BundleDefinition::default()).await.unwrap();
        assert_eq!(host.name(), "fixture");
    }
}
