use std::collections::BTreeMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use provisio_target::{PluginManager, PluginSettingsStore};

use crate::files::clear_dir_contents;
use crate::DuckDbTarget;

/// Plugin names double as directory names under `plugins/`.
fn validate_plugin_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("invalid plugin name {name:?}");
    }
    Ok(())
}

impl DuckDbTarget {
    async fn plugin_state(&self, name: &str) -> Result<Option<bool>> {
        let conn = self.conn.lock().await;
        let result = conn
            .prepare(&format!(
                "SELECT activated FROM {} WHERE name = ?1",
                self.tables.plugins
            ))?
            .query_row(duckdb::params![name], |row| row.get::<_, bool>(0))
            .ok();
        Ok(result)
    }

    /// Names of all plugins currently marked active, sorted.
    pub async fn activated_plugins(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT name FROM {} WHERE activated ORDER BY name",
            self.tables.plugins
        ))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    /// Stored settings for `plugin`, decoded from their JSON text.
    pub async fn load_plugin_settings(&self, plugin: &str) -> Result<BTreeMap<String, Value>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT setting_name, json_value FROM {} WHERE plugin_name = ?1",
            self.tables.plugin_settings
        ))?;
        let rows = stmt.query_map(duckdb::params![plugin], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut settings = BTreeMap::new();
        for row in rows {
            let (name, raw) = row?;
            settings.insert(name, serde_json::from_str(&raw)?);
        }
        Ok(settings)
    }
}

#[async_trait]
impl PluginManager for DuckDbTarget {
    async fn install_activated(&self) -> Result<Vec<String>> {
        {
            let conn = self.conn.lock().await;
            conn.execute(
                &format!(
                    "UPDATE {} SET installed = true, updated_at = CURRENT_TIMESTAMP \
                     WHERE activated AND NOT installed",
                    self.tables.plugins
                ),
                [],
            )?;
        }
        self.activated_plugins().await
    }

    async fn activate(&self, name: &str) -> Result<bool> {
        validate_plugin_name(name)?;
        let plugin_dir = self.document_root.join("plugins").join(name);
        if !plugin_dir.is_dir() {
            bail!("plugin {name} not found at {}", plugin_dir.display());
        }
        let sql = match self.plugin_state(name).await? {
            Some(true) => return Ok(false),
            Some(false) => format!(
                "UPDATE {} SET activated = true, installed = true, \
                 updated_at = CURRENT_TIMESTAMP WHERE name = ?1",
                self.tables.plugins
            ),
            None => format!(
                "INSERT INTO {} (name, activated, installed, updated_at) \
                 VALUES (?1, true, true, CURRENT_TIMESTAMP)",
                self.tables.plugins
            ),
        };
        let conn = self.conn.lock().await;
        conn.execute(&sql, duckdb::params![name])?;
        info!(plugin = name, "Plugin activated");
        Ok(true)
    }

    async fn deactivate(&self, name: &str) -> Result<bool> {
        validate_plugin_name(name)?;
        if self.plugin_state(name).await? != Some(true) {
            return Ok(false);
        }
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "UPDATE {} SET activated = false, updated_at = CURRENT_TIMESTAMP \
                 WHERE name = ?1",
                self.tables.plugins
            ),
            duckdb::params![name],
        )?;
        info!(plugin = name, "Plugin deactivated");
        Ok(true)
    }

    async fn clear_caches(&self) -> Result<()> {
        clear_dir_contents(&self.document_root.join("tmp").join("cache")).await
    }

    async fn trigger_core_update(&self) -> Result<Vec<String>> {
        self.run_upgrades().await
    }
}

#[async_trait]
impl PluginSettingsStore for DuckDbTarget {
    async fn save_plugin_settings(
        &self,
        plugin: &str,
        settings: &BTreeMap<String, Value>,
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        for (name, value) in settings {
            tx.execute(
                &format!(
                    "INSERT INTO {} (plugin_name, setting_name, json_value, updated_at) \
                     VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP) \
                     ON CONFLICT (plugin_name, setting_name) DO UPDATE \
                     SET json_value = EXCLUDED.json_value, updated_at = EXCLUDED.updated_at",
                    self.tables.plugin_settings
                ),
                duckdb::params![plugin, name, value.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
