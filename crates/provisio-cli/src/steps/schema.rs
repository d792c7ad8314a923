use async_trait::async_trait;
use tracing::info;

use provisio_core::ProvisionError;

use crate::state::StepContext;
use crate::workflow::{Step, StepOutcome};

/// Create the schema on an empty database, seed the guest account and apply
/// pending component upgrades.
pub struct CreateSchema;

#[async_trait]
impl Step for CreateSchema {
    fn name(&self) -> &'static str {
        "create_schema"
    }

    async fn execute(&self, cx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
        let db = cx.db(self.name())?;

        let installed = db.tables_installed().await?;
        if !installed.is_empty() {
            info!(tables = installed.len(), "Tables already installed");
            return Ok(StepOutcome::AlreadySatisfied);
        }

        db.create_tables().await?;
        db.create_guest_account().await?;
        let su = db.elevate().await?;
        let applied = db.apply_pending_upgrades(&su).await?;
        info!(upgrades = ?applied, "Schema created");
        Ok(StepOutcome::Applied)
    }
}
