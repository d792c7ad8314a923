use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use provisio_core::config::DatabaseSettings;
use provisio_core::ProvisionError;

/// Proof that the caller was granted privileged access by a [`UserStore`].
///
/// Privileged adapter methods take `&Superuser` instead of consulting any
/// ambient authentication state. The token is neither `Clone` nor `Copy`.
#[derive(Debug)]
pub struct Superuser {
    issuer: String,
}

impl Superuser {
    /// Mint a token. Only [`UserStore::elevate`] implementations should call this.
    pub fn issued_by(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteRecord {
    pub id: String,
    pub name: String,
    pub url: String,
    pub timezone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticResult {
    pub label: String,
    pub status: DiagnosticStatus,
    pub comment: Option<String>,
}

impl DiagnosticResult {
    pub fn ok(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status: DiagnosticStatus::Ok,
            comment: None,
        }
    }

    pub fn warning(label: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status: DiagnosticStatus::Warning,
            comment: Some(comment.into()),
        }
    }

    pub fn error(label: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status: DiagnosticStatus::Error,
            comment: Some(comment.into()),
        }
    }
}

/// Files the provisioner writes into the target install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    HeaderLogo,
}

impl Asset {
    /// Location relative to the document root.
    pub fn relative_path(self) -> &'static str {
        match self {
            Asset::HeaderLogo => "misc/user/logo-header.png",
        }
    }
}

#[async_trait]
pub trait SchemaStore: Send + Sync {
    async fn tables_installed(&self) -> anyhow::Result<BTreeSet<String>>;
    async fn create_tables(&self) -> anyhow::Result<()>;
    /// Seed the built-in anonymous account used for unauthenticated access.
    async fn create_guest_account(&self) -> anyhow::Result<()>;
    /// Apply internal component upgrades not applied yet. Returns their ids.
    async fn apply_pending_upgrades(&self, su: &Superuser) -> anyhow::Result<Vec<String>>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn elevate(&self) -> anyhow::Result<Superuser>;
    async fn user_exists(&self, login: &str) -> anyhow::Result<bool>;
    async fn user_email_exists(&self, email: &str) -> anyhow::Result<bool>;
    async fn create_user(
        &self,
        su: &Superuser,
        login: &str,
        password: &str,
        email: &str,
    ) -> anyhow::Result<()>;
    async fn grant_superuser(&self, su: &Superuser, login: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait SiteStore: Send + Sync {
    async fn list_sites(&self) -> anyhow::Result<Vec<SiteRecord>>;
    async fn create_site(
        &self,
        su: &Superuser,
        name: &str,
        url: &str,
        timezone_offset: i32,
    ) -> anyhow::Result<SiteRecord>;
}

/// Flat key/value store. Writes always overwrite.
#[async_trait]
pub trait OptionStore: Send + Sync {
    async fn set_option(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn get_option(&self, key: &str) -> anyhow::Result<Option<String>>;
}

/// Plugin lifecycle. Activating an active plugin and deactivating an inactive
/// one are no-ops that return `false`.
#[async_trait]
pub trait PluginManager: Send + Sync {
    /// Install every plugin currently marked active. Returns their names.
    async fn install_activated(&self) -> anyhow::Result<Vec<String>>;
    async fn activate(&self, name: &str) -> anyhow::Result<bool>;
    async fn deactivate(&self, name: &str) -> anyhow::Result<bool>;
    async fn clear_caches(&self) -> anyhow::Result<()>;
    /// Run the target's own update procedure. Returns applied component ids.
    async fn trigger_core_update(&self) -> anyhow::Result<Vec<String>>;
}

#[async_trait]
pub trait PluginSettingsStore: Send + Sync {
    async fn save_plugin_settings(
        &self,
        plugin: &str,
        settings: &BTreeMap<String, Value>,
    ) -> anyhow::Result<()>;
}

/// A live database connection and the adapters that need one.
#[async_trait]
pub trait Database: SchemaStore + UserStore + SiteStore + OptionStore + PluginManager {
    async fn connection_is_utf8(&self) -> anyhow::Result<bool>;

    /// The plugin settings capability, when this target has one.
    async fn plugin_settings<'a>(
        &'a self,
    ) -> anyhow::Result<Option<&'a dyn PluginSettingsStore>>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection. Failures the caller may retry must be reported as
    /// [`ProvisionError::TransientConnectivity`].
    async fn connect(
        &self,
        settings: &DatabaseSettings,
    ) -> Result<Box<dyn Database>, ProvisionError>;
}

#[async_trait]
pub trait Diagnostics: Send + Sync {
    async fn run_all(&self) -> anyhow::Result<Vec<DiagnosticResult>>;
}

#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn clear_derived_caches(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn store_asset(&self, asset: Asset, bytes: &[u8]) -> anyhow::Result<()>;
}
