#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use provisio_cli::fetch::Fetcher;
use provisio_cli::{Adapters, Provisioner, StepContext};
use provisio_core::config::DatabaseSettings;
use provisio_core::document::{MemoryConfigBackend, PersistedConfig};
use provisio_core::retry::Backoff;
use provisio_core::{ProvisionConfig, ProvisionError};
use provisio_target::{
    Asset, AssetStore, CacheInvalidator, Connector, Database, DiagnosticResult, Diagnostics,
    OptionStore, PluginManager, PluginSettingsStore, SchemaStore, SiteRecord, SiteStore,
    Superuser, UserStore,
};

/// Everything the fake target knows, plus a log of adapter calls in order.
#[derive(Debug, Default)]
pub struct FakeState {
    pub calls: Vec<String>,
    pub tables: BTreeSet<String>,
    pub users: BTreeMap<String, (String, bool)>,
    pub sites: Vec<SiteRecord>,
    pub options: BTreeMap<String, String>,
    pub known_plugins: BTreeSet<String>,
    pub active_plugins: BTreeSet<String>,
    pub plugin_settings: BTreeMap<String, BTreeMap<String, Value>>,
    pub assets: BTreeMap<&'static str, Vec<u8>>,
    pub fetched: Vec<String>,
    pub connect_failures: usize,
    pub connect_attempts: usize,
    pub non_utf8: bool,
    pub no_settings_store: bool,
    pub fetch_fails: bool,
    pub core_updates: usize,
}

#[derive(Clone, Default)]
pub struct FakeTarget {
    state: Arc<Mutex<FakeState>>,
}

pub const LOGO: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 42];

impl FakeTarget {
    pub fn new() -> Self {
        let target = Self::default();
        target.state().known_plugins =
            ["Heatmaps", "CustomDimensions", "Marketplace"].map(String::from).into();
        target
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state lock")
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn position(&self, call: &str) -> usize {
        self.calls()
            .iter()
            .position(|c| c == call)
            .unwrap_or_else(|| panic!("{call} was never called"))
    }

    fn record(&self, call: impl Into<String>) {
        self.state().calls.push(call.into());
    }

    pub fn adapters(&self) -> Adapters {
        Adapters {
            connector: Box::new(self.clone()),
            diagnostics: Box::new(self.clone()),
            caches: Box::new(self.clone()),
            assets: Box::new(self.clone()),
            fetcher: Box::new(self.clone()),
        }
    }
}

pub fn sample_json() -> Value {
    json!({
        "document_root": "/srv/analytics",
        "database": {
            "host": "db",
            "adapter": "PDO\\MYSQL",
            "username": "analytics",
            "password": "db-secret",
            "dbname": "analytics",
            "tables_prefix": "pw_"
        },
        "login": "admin",
        "password": "correct horse",
        "email": "admin@example.org",
        "site_name": "Example",
        "site_url": "https://analytics.example.org/",
        "base_domain": "example.org"
    })
}

pub fn config_from(value: Value) -> ProvisionConfig {
    ProvisionConfig::from_json_str(&value.to_string()).expect("valid config")
}

pub fn backoff() -> Backoff {
    Backoff::from_secs(&[10, 20, 30]).expect("valid schedule")
}

pub fn provisioner(
    target: &FakeTarget,
    config: ProvisionConfig,
    backend: &MemoryConfigBackend,
) -> Provisioner {
    let persisted = PersistedConfig::open(Box::new(backend.clone())).expect("open config");
    Provisioner::new(StepContext::new(
        config,
        persisted,
        target.adapters(),
        backoff(),
    ))
}

#[async_trait]
impl Connector for FakeTarget {
    async fn connect(
        &self,
        settings: &DatabaseSettings,
    ) -> Result<Box<dyn Database>, ProvisionError> {
        let mut state = self.state();
        state.connect_attempts += 1;
        state.calls.push(format!("connect:{}", settings.dbname));
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(ProvisionError::TransientConnectivity(
                "connection refused".into(),
            ));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl Diagnostics for FakeTarget {
    async fn run_all(&self) -> Result<Vec<DiagnosticResult>> {
        self.record("run_diagnostics");
        Ok(vec![
            DiagnosticResult::ok("document root"),
            DiagnosticResult::warning("plugins directory", "missing"),
        ])
    }
}

#[async_trait]
impl CacheInvalidator for FakeTarget {
    async fn clear_derived_caches(&self) -> Result<()> {
        self.record("clear_derived_caches");
        Ok(())
    }
}

#[async_trait]
impl AssetStore for FakeTarget {
    async fn store_asset(&self, asset: Asset, bytes: &[u8]) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("store_asset:{}", asset.relative_path()));
        state.assets.insert(asset.relative_path(), bytes.to_vec());
        Ok(())
    }
}

#[async_trait]
impl Fetcher for FakeTarget {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProvisionError> {
        let mut state = self.state();
        state.calls.push(format!("fetch:{url}"));
        state.fetched.push(url.to_string());
        if state.fetch_fails {
            return Err(ProvisionError::Fetch {
                url: url.to_string(),
                reason: "HTTP 404 Not Found".into(),
            });
        }
        Ok(LOGO.to_vec())
    }
}

#[async_trait]
impl SchemaStore for FakeTarget {
    async fn tables_installed(&self) -> Result<BTreeSet<String>> {
        self.record("tables_installed");
        Ok(self.state().tables.clone())
    }

    async fn create_tables(&self) -> Result<()> {
        let mut state = self.state();
        state.calls.push("create_tables".into());
        if !state.tables.is_empty() {
            bail!("tables already exist");
        }
        state.tables = ["pw_users", "pw_sites", "pw_options"].map(String::from).into();
        Ok(())
    }

    async fn create_guest_account(&self) -> Result<()> {
        let mut state = self.state();
        state.calls.push("create_guest_account".into());
        state
            .users
            .insert("anonymous".into(), ("anonymous@example.org".into(), false));
        Ok(())
    }

    async fn apply_pending_upgrades(&self, _su: &Superuser) -> Result<Vec<String>> {
        self.record("apply_pending_upgrades");
        Ok(vec!["core-1.1.0".into()])
    }
}

#[async_trait]
impl UserStore for FakeTarget {
    async fn elevate(&self) -> Result<Superuser> {
        self.record("elevate");
        Ok(Superuser::issued_by("fake"))
    }

    async fn user_exists(&self, login: &str) -> Result<bool> {
        self.record(format!("user_exists:{login}"));
        Ok(self.state().users.contains_key(login))
    }

    async fn user_email_exists(&self, email: &str) -> Result<bool> {
        self.record(format!("user_email_exists:{email}"));
        Ok(self.state().users.values().any(|(e, _)| e == email))
    }

    async fn create_user(
        &self,
        _su: &Superuser,
        login: &str,
        _password: &str,
        email: &str,
    ) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("create_user:{login}"));
        if state.tables.is_empty() {
            bail!("no schema");
        }
        if state.users.contains_key(login) {
            bail!("duplicate user {login}");
        }
        state.users.insert(login.into(), (email.into(), false));
        Ok(())
    }

    async fn grant_superuser(&self, _su: &Superuser, login: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("grant_superuser:{login}"));
        match state.users.get_mut(login) {
            Some(user) => {
                user.1 = true;
                Ok(())
            }
            None => bail!("no user {login}"),
        }
    }
}

#[async_trait]
impl SiteStore for FakeTarget {
    async fn list_sites(&self) -> Result<Vec<SiteRecord>> {
        self.record("list_sites");
        Ok(self.state().sites.clone())
    }

    async fn create_site(
        &self,
        _su: &Superuser,
        name: &str,
        url: &str,
        timezone_offset: i32,
    ) -> Result<SiteRecord> {
        let mut state = self.state();
        state.calls.push(format!("create_site:{name}"));
        if !state.users.values().any(|(_, superuser)| *superuser) {
            bail!("no superuser yet");
        }
        let site = SiteRecord {
            id: format!("site_{}", state.sites.len() + 1),
            name: name.into(),
            url: url.into(),
            timezone: format!("UTC{timezone_offset:+}"),
        };
        state.sites.push(site.clone());
        Ok(site)
    }
}

#[async_trait]
impl OptionStore for FakeTarget {
    async fn set_option(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("set_option:{key}"));
        state.options.insert(key.into(), value.into());
        Ok(())
    }

    async fn get_option(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state().options.get(key).cloned())
    }
}

#[async_trait]
impl PluginManager for FakeTarget {
    async fn install_activated(&self) -> Result<Vec<String>> {
        self.record("install_activated");
        Ok(self.state().active_plugins.iter().cloned().collect())
    }

    async fn activate(&self, name: &str) -> Result<bool> {
        let mut state = self.state();
        state.calls.push(format!("activate:{name}"));
        if !state.known_plugins.contains(name) {
            bail!("plugin {name} not found");
        }
        Ok(state.active_plugins.insert(name.into()))
    }

    async fn deactivate(&self, name: &str) -> Result<bool> {
        let mut state = self.state();
        state.calls.push(format!("deactivate:{name}"));
        Ok(state.active_plugins.remove(name))
    }

    async fn clear_caches(&self) -> Result<()> {
        self.record("clear_plugin_caches");
        Ok(())
    }

    async fn trigger_core_update(&self) -> Result<Vec<String>> {
        let mut state = self.state();
        state.calls.push("trigger_core_update".into());
        state.core_updates += 1;
        Ok(Vec::new())
    }
}

#[async_trait]
impl PluginSettingsStore for FakeTarget {
    async fn save_plugin_settings(
        &self,
        plugin: &str,
        settings: &BTreeMap<String, Value>,
    ) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("save_plugin_settings:{plugin}"));
        let stored = state.plugin_settings.entry(plugin.into()).or_default();
        for (key, value) in settings {
            stored.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl Database for FakeTarget {
    async fn connection_is_utf8(&self) -> Result<bool> {
        Ok(!self.state().non_utf8)
    }

    async fn plugin_settings<'a>(&'a self) -> Result<Option<&'a dyn PluginSettingsStore>> {
        if self.state().no_settings_store {
            Ok(None)
        } else {
            Ok(Some(self as &dyn PluginSettingsStore))
        }
    }
}
