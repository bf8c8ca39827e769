//! A minimal in-memory bundle catalog backing `bundle.list/info/add/remove/install`.
//!
//! The real bundle module loader is out of scope (`SPEC_FULL.md` §1): this
//! catalog only tracks which bundle *names* the server currently knows
//! about, not their contents. A concrete `BundleFactory` is what actually
//! resolves a name to a runnable [`amp_bundle::BundleHost`].

use std::collections::BTreeMap;

use amp_protocol::ProtocolError;
use parking_lot::Mutex;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub struct BundleCatalogEntry {
    pub name: String,
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl BundleCatalogEntry {
    fn to_json(&self) -> Value {
        json!({"name": self.name, "provider": self.provider, "model": self.model})
    }
}

pub struct BundleCatalog {
    entries: Mutex<BTreeMap<String, BundleCatalogEntry>>,
}

impl Default for BundleCatalog {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            "fixture".to_string(),
            BundleCatalogEntry {
                name: "fixture".to_string(),
                provider: None,
                model: None,
            },
        );
        Self {
            entries: Mutex::new(entries),
        }
    }
}

impl BundleCatalog {
    #[must_use]
    pub fn list(&self) -> Vec<Value> {
        self.entries.lock().values().map(BundleCatalogEntry::to_json).collect()
    }

    pub fn info(&self, name: &str) -> Result<Value, ProtocolError> {
        self.entries
            .lock()
            .get(name)
            .map(BundleCatalogEntry::to_json)
            .ok_or_else(|| ProtocolError::BundleNotFound(name.to_string()))
    }

    pub fn add(&self, entry: BundleCatalogEntry) -> Result<Value, ProtocolError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&entry.name) {
            return Err(ProtocolError::BundleAddFailed(format!("bundle `{}` already exists", entry.name)));
        }
        let json = entry.to_json();
        entries.insert(entry.name.clone(), entry);
        Ok(json)
    }

    pub fn remove(&self, name: &str) -> Result<(), ProtocolError> {
        self.entries
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ProtocolError::BundleRemoveFailed(format!("bundle `{name}` not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_bundle_is_preloaded() {
        let catalog = BundleCatalog::default();
        assert!(catalog.info("fixture").is_ok());
    }

    #[test]
    fn add_then_list_then_remove() {
        let catalog = BundleCatalog::default();
        catalog
            .add(BundleCatalogEntry {
                name: "custom".into(),
                provider: Some("anthropic".into()),
                model: None,
            })
            .unwrap();
        assert_eq!(catalog.list().len(), 2);
        catalog.remove("custom").unwrap();
        assert!(catalog.info("custom").is_err());
    }

    #[test]
    fn add_duplicate_fails() {
        let catalog = BundleCatalog::default();
        let err = catalog
            .add(BundleCatalogEntry {
                name: "fixture".into(),
                provider: None,
                model: None,
            })
            .unwrap_err();
        assert_eq!(err.code(), "BUNDLE_ADD_FAILED");
    }
}
