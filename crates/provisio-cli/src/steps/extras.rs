use async_trait::async_trait;
use tracing::info;

use provisio_core::options::option_text;
use provisio_core::ProvisionError;

use crate::state::StepContext;
use crate::workflow::{Step, StepOutcome};

/// Merge section/key overrides into the persisted config. Incoming values win.
pub struct SetConfigExtras;

#[async_trait]
impl Step for SetConfigExtras {
    fn name(&self) -> &'static str {
        "set_config_extras"
    }

    async fn execute(&self, cx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
        let config = std::sync::Arc::clone(&cx.config);
        let Some(extras) = config.extras.as_ref() else {
            return Ok(StepOutcome::Skipped("no config extras configured".into()));
        };
        cx.persisted.merge(extras);
        cx.persisted.commit()?;
        info!(sections = ?extras.keys().collect::<Vec<_>>(), "Config extras merged");
        Ok(StepOutcome::Applied)
    }
}

/// Write each flat option through the option store.
pub struct SetOptionExtras;

#[async_trait]
impl Step for SetOptionExtras {
    fn name(&self) -> &'static str {
        "set_option_extras"
    }

    async fn execute(&self, cx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
        let Some(options) = cx.config.options.as_ref() else {
            return Ok(StepOutcome::Skipped("no option extras configured".into()));
        };
        let db = cx.db(self.name())?;
        for (key, value) in options {
            db.set_option(key, &option_text(value)).await?;
        }
        info!(count = options.len(), "Custom options set");
        Ok(StepOutcome::Applied)
    }
}
