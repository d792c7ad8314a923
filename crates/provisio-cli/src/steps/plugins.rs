use async_trait::async_trait;
use tracing::{debug, info, warn};

use provisio_core::ProvisionError;

use crate::state::StepContext;
use crate::workflow::{Step, StepOutcome};

/// Clear plugin caches, activate the configured plugins and run the core
/// update again.
///
/// The update runs whenever a plugin list is configured, even an empty one.
pub struct SetupPlugins;

#[async_trait]
impl Step for SetupPlugins {
    fn name(&self) -> &'static str {
        "setup_plugins"
    }

    async fn execute(&self, cx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
        let db = cx.db(self.name())?;
        db.clear_caches().await?;

        let Some(plugins) = cx.config.plugins.as_ref() else {
            return Ok(StepOutcome::Skipped("no plugins configured".into()));
        };
        for plugin in plugins {
            if db.activate(plugin).await? {
                info!(plugin = %plugin, "Plugin activated");
            } else {
                debug!(plugin = %plugin, "Plugin already active");
            }
        }
        let applied = db.trigger_core_update().await?;
        info!(upgrades = ?applied, "Core update finished");
        Ok(StepOutcome::Applied)
    }
}

pub struct DeactivatePlugins;

#[async_trait]
impl Step for DeactivatePlugins {
    fn name(&self) -> &'static str {
        "deactivate_plugins"
    }

    async fn execute(&self, cx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
        let Some(plugins) = cx.config.deactivate_plugins.as_ref() else {
            return Ok(StepOutcome::Skipped("no plugins to deactivate".into()));
        };
        let db = cx.db(self.name())?;
        for plugin in plugins {
            if db.deactivate(plugin).await? {
                info!(plugin = %plugin, "Plugin deactivated");
            } else {
                warn!(plugin = %plugin, "Plugin was not active");
            }
        }
        Ok(StepOutcome::Applied)
    }
}

/// Save per-plugin settings when the target has a settings store.
///
/// A missing store is a skip, not a failure.
pub struct SetPluginSettings;

#[async_trait]
impl Step for SetPluginSettings {
    fn name(&self) -> &'static str {
        "set_plugin_settings"
    }

    async fn execute(&self, cx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
        let Some(settings) = cx.config.plugin_settings.as_ref() else {
            return Ok(StepOutcome::Skipped("no plugin_settings configured".into()));
        };
        let db = cx.db(self.name())?;
        let Some(store) = db.plugin_settings().await? else {
            warn!("Target has no plugin settings store, skipping plugin settings");
            return Ok(StepOutcome::Skipped(
                "plugin settings capability missing".into(),
            ));
        };
        for (plugin, values) in settings {
            store.save_plugin_settings(plugin, values).await?;
            info!(plugin = %plugin, keys = values.len(), "Plugin settings saved");
        }
        Ok(StepOutcome::Applied)
    }
}
