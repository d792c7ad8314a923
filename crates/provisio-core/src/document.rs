//! Persisted, sectioned configuration of the target install.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ConfigExtras;
use crate::error::ProvisionError;

pub type Section = BTreeMap<String, Value>;

pub const GENERAL: &str = "General";
pub const DATABASE: &str = "database";

/// Two-level `section -> key -> value` configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDocument {
    sections: BTreeMap<String, Section>,
}

impl ConfigDocument {
    pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
        self.sections.get(section)?.get(key)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Set one key, creating the section when it does not exist yet.
    pub fn set(&mut self, section: &str, key: &str, value: Value) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub fn remove(&mut self, section: &str, key: &str) -> Option<Value> {
        self.sections.get_mut(section)?.remove(key)
    }

    pub fn replace_section(&mut self, name: &str, section: Section) {
        self.sections.insert(name.to_string(), section);
    }

    /// Overlay `extras` section by section, key by key. Incoming values win;
    /// keys not mentioned in `extras` keep their current value.
    pub fn merge(&mut self, extras: &ConfigExtras) {
        for (section, settings) in extras {
            let target = self.sections.entry(section.clone()).or_default();
            for (key, value) in settings {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Where a [`ConfigDocument`] lives between runs.
pub trait ConfigBackend: Send + Sync {
    /// Load the stored document, or an empty one when nothing is stored yet.
    fn load(&self) -> anyhow::Result<ConfigDocument>;
    fn save(&self, document: &ConfigDocument) -> anyhow::Result<()>;
}

/// The target's configuration as seen by a provisioning run.
///
/// Mutations only touch the in-memory document; nothing reaches the backend
/// until [`PersistedConfig::commit`] is called.
pub struct PersistedConfig {
    document: ConfigDocument,
    backend: Box<dyn ConfigBackend>,
    dirty: bool,
}

impl PersistedConfig {
    pub fn open(backend: Box<dyn ConfigBackend>) -> Result<Self, ProvisionError> {
        let document = backend.load()?;
        Ok(Self {
            document,
            backend,
            dirty: false,
        })
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
        self.document.get(section, key)
    }

    pub fn set(&mut self, section: &str, key: &str, value: Value) {
        self.document.set(section, key, value);
        self.dirty = true;
    }

    pub fn remove(&mut self, section: &str, key: &str) -> Option<Value> {
        let removed = self.document.remove(section, key);
        self.dirty |= removed.is_some();
        removed
    }

    pub fn replace_section(&mut self, name: &str, section: Section) {
        self.document.replace_section(name, section);
        self.dirty = true;
    }

    pub fn merge(&mut self, extras: &ConfigExtras) {
        self.document.merge(extras);
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the whole document to the backend, dirty or not.
    pub fn commit(&mut self) -> Result<(), ProvisionError> {
        self.backend.save(&self.document)?;
        self.dirty = false;
        Ok(())
    }
}

/// Backend that keeps the last committed document in memory.
///
/// Clones share storage, so a test can hand one clone to the provisioner
/// and inspect what was committed through another.
#[derive(Clone, Default)]
pub struct MemoryConfigBackend {
    stored: Arc<Mutex<ConfigDocument>>,
    commits: Arc<Mutex<usize>>,
}

impl MemoryConfigBackend {
    pub fn with_document(document: ConfigDocument) -> Self {
        Self {
            stored: Arc::new(Mutex::new(document)),
            commits: Arc::default(),
        }
    }

    pub fn stored(&self) -> anyhow::Result<ConfigDocument> {
        let guard = self
            .stored
            .lock()
            .map_err(|_| anyhow!("config store lock poisoned"))?;
        Ok(guard.clone())
    }

    pub fn commit_count(&self) -> usize {
        self.commits.lock().map(|count| *count).unwrap_or_default()
    }
}

impl ConfigBackend for MemoryConfigBackend {
    fn load(&self) -> anyhow::Result<ConfigDocument> {
        self.stored()
    }

    fn save(&self, document: &ConfigDocument) -> anyhow::Result<()> {
        let mut guard = self
            .stored
            .lock()
            .map_err(|_| anyhow!("config store lock poisoned"))?;
        *guard = document.clone();
        if let Ok(mut commits) = self.commits.lock() {
            *commits += 1;
        }
        Ok(())
    }
}
