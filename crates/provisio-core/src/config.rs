use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProvisionError;
use crate::retry::{Backoff, DEFAULT_DB_RETRY_SECS};
use crate::secret::Secret;

/// Section name -> setting key -> value.
pub type ConfigExtras = BTreeMap<String, BTreeMap<String, Value>>;

/// Plugin name -> setting key -> value.
pub type PluginSettings = BTreeMap<String, BTreeMap<String, Value>>;

/// The declarative description of one provisioning run.
///
/// Parsed once from the JSON document named on the command line and never
/// mutated afterwards. Optional sections are `None` when the key is absent
/// from the document, which is distinct from an empty list or map: an empty
/// `plugins` array still triggers the second core update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    pub document_root: PathBuf,
    pub database: DatabaseSettings,

    pub login: String,
    pub password: Secret,
    pub email: String,

    pub site_name: String,
    pub site_url: String,
    pub base_domain: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_save_handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<PrivacySettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<ConfigExtras>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deactivate_plugins: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branding: Option<BrandingSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_settings: Option<PluginSettings>,
}

/// Connection parameters persisted verbatim into the target's `database`
/// config section. Keys this struct does not know are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub host: String,
    pub adapter: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Secret,
    pub dbname: String,
    #[serde(default)]
    pub tables_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<DatabasePort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A port as the target's own config files write it: a number or a string.
/// Persisted in the same form it was read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatabasePort {
    Number(u16),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymize_ip: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub honor_do_not_track: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandingSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_url: Option<String>,
}

impl ProvisionConfig {
    /// Read and validate the provisioning document at `path`.
    pub fn load(path: &Path) -> Result<Self, ProvisionError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw).map_err(|e| match e {
            ProvisionError::InvalidConfig(msg) => {
                ProvisionError::InvalidConfig(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ProvisionError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| ProvisionError::InvalidConfig(format!("cannot parse JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ProvisionError> {
        if self.document_root.as_os_str().is_empty() {
            return Err(ProvisionError::InvalidConfig(
                "document_root must not be empty".to_string(),
            ));
        }
        let required = [
            ("login", self.login.as_str()),
            ("password", self.password.expose()),
            ("email", self.email.as_str()),
            ("site_name", self.site_name.as_str()),
            ("site_url", self.site_url.as_str()),
            ("base_domain", self.base_domain.as_str()),
            ("database.adapter", self.database.adapter.as_str()),
            ("database.dbname", self.database.dbname.as_str()),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ProvisionError::InvalidConfig(format!(
                    "{field} must not be empty"
                )));
            }
        }
        let plugin_lists = [
            ("plugins", self.plugins.as_deref()),
            ("deactivate_plugins", self.deactivate_plugins.as_deref()),
        ];
        for (field, list) in plugin_lists {
            if list.unwrap_or_default().iter().any(|p| p.trim().is_empty()) {
                return Err(ProvisionError::InvalidConfig(format!(
                    "{field} contains an empty plugin name"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Process-level knobs that are not part of the provisioning document.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub db_retry: Backoff,
    pub fetch_timeout_secs: u64,
    pub log_format: LogFormat,
}

impl RunSettings {
    pub fn from_env() -> Result<Self, ProvisionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    ///
    /// - `PROVISIO_DB_RETRY_SECS`: comma-separated, non-decreasing seconds
    /// - `PROVISIO_FETCH_TIMEOUT_SECS`: branding fetch timeout (default 30)
    /// - `PROVISIO_LOG_FORMAT`: `text` (default) or `json`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProvisionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_retry = match lookup("PROVISIO_DB_RETRY_SECS") {
            Some(raw) => {
                let secs = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        s.parse::<u64>().map_err(|e| {
                            ProvisionError::InvalidConfig(format!(
                                "PROVISIO_DB_RETRY_SECS: invalid delay {s:?}: {e}"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Backoff::from_secs(&secs)?
            }
            None => Backoff::from_secs(&DEFAULT_DB_RETRY_SECS)?,
        };
        let fetch_timeout_secs = match lookup("PROVISIO_FETCH_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map_err(|e| {
                ProvisionError::InvalidConfig(format!("PROVISIO_FETCH_TIMEOUT_SECS: {e}"))
            })?,
            None => 30,
        };
        let log_format = match lookup("PROVISIO_LOG_FORMAT").as_deref().map(str::trim) {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        Ok(Self {
            db_retry,
            fetch_timeout_secs,
            log_format,
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
