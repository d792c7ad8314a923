use async_trait::async_trait;
use tracing::info;

use provisio_core::document::GENERAL;
use provisio_core::ProvisionError;

use crate::state::StepContext;
use crate::workflow::{Step, StepOutcome};

/// Install active plugins, clear the in-progress marker and run the target's
/// own update procedure.
pub struct Finish;

#[async_trait]
impl Step for Finish {
    fn name(&self) -> &'static str {
        "finish"
    }

    async fn execute(&self, cx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
        let installed = cx.db(self.name())?.install_activated().await?;
        info!(plugins = ?installed, "Activated plugins installed");

        cx.persisted.remove(GENERAL, "installation_in_progress");
        cx.persisted.commit()?;

        let applied = cx.db(self.name())?.trigger_core_update().await?;
        info!(upgrades = ?applied, "Core update finished");
        Ok(StepOutcome::Applied)
    }
}
