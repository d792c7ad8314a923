use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use provisio_core::document::GENERAL;
use provisio_core::hosts::trusted_hosts;
use provisio_core::ProvisionError;

use crate::state::StepContext;
use crate::workflow::{Step, StepOutcome};

/// Create the primary site unless one with the same name exists, then
/// persist the trusted hosts on every run.
pub struct AddPrimarySite;

#[async_trait]
impl Step for AddPrimarySite {
    fn name(&self) -> &'static str {
        "add_primary_site"
    }

    async fn execute(&self, cx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
        let config = Arc::clone(&cx.config);
        let db = cx.db(self.name())?;

        let exists = db
            .list_sites()
            .await?
            .iter()
            .any(|site| site.name == config.site_name);
        let outcome = if exists {
            info!(site = %config.site_name, "Primary site already exists");
            StepOutcome::AlreadySatisfied
        } else {
            let su = db.elevate().await?;
            let site = db
                .create_site(&su, &config.site_name, &config.site_url, 0)
                .await?;
            info!(site_id = %site.id, site = %site.name, "Primary site created");
            StepOutcome::Applied
        };

        let hosts = trusted_hosts(&config.base_domain, &config.site_url);
        info!(hosts = ?hosts, "Trusted hosts set");
        cx.persisted.set(GENERAL, "trusted_hosts", json!(hosts));
        cx.persisted.commit()?;
        Ok(outcome)
    }
}
