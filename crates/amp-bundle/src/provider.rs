//! Provider auto-detection from environment variables.
//!
//! Resolution order is first-match over a fixed list, made explicit and
//! testable here rather than left to enumeration order over a set of
//! present env vars.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    AzureOpenAi,
    Google,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::AzureOpenAi => "azure_openai",
            Self::Google => "google",
        }
    }

    #[must_use]
    pub fn env_var(self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::AzureOpenAi => "AZURE_OPENAI_API_KEY",
            Self::Google => "GOOGLE_API_KEY",
        }
    }
}

const DETECTION_ORDER: [ProviderKind; 4] = [
    ProviderKind::Anthropic,
    ProviderKind::OpenAi,
    ProviderKind::AzureOpenAi,
    ProviderKind::Google,
];

/// Every known provider, in detection order.
#[must_use]
pub fn all() -> &'static [ProviderKind] {
    &DETECTION_ORDER
}

/// Source of environment variables, abstracted so detection is testable
/// without mutating the process environment.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads from the real process environment.
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// First provider (in [`DETECTION_ORDER`]) whose API key env var is set.
#[must_use]
pub fn default_provider(env: &dyn EnvSource) -> Option<ProviderKind> {
    DETECTION_ORDER
        .into_iter()
        .find(|p| env.get(p.env_var()).is_some_and(|v| !v.is_empty()))
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

    #[test]
    fn no_keys_set_resolves_to_none() {
        let env = MapEnv(HashMap::new());
        assert_eq!(default_provider(&env), None);
    }

    #[test]
    fn single_key_resolves_to_that_provider() {
        let env = MapEnv(HashMap::from([("OPENAI_API_KEY", "sk-x")]));
        assert_eq!(default_provider(&env), Some(ProviderKind::OpenAi));
    }

    #[test]
    fn multiple_keys_prefers_fixed_order() {
        let env = MapEnv(HashMap::from([
            ("GOOGLE_API_KEY", "g"),
            ("ANTHROPIC_API_KEY", "a"),
        ]));
        assert_eq!(default_provider(&env), Some(ProviderKind::Anthropic));
    }

    #[test]
    fn empty_value_does_not_count_as_set() {
        let env = MapEnv(HashMap::from([("ANTHROPIC_API_KEY", "")]));
        assert_eq!(default_provider(&env), None);
    }
}
