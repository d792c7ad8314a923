use async_trait::async_trait;
use tracing::info;

use provisio_core::ProvisionError;
use provisio_target::Asset;

use crate::state::StepContext;
use crate::workflow::{Step, StepOutcome};

pub const CUSTOM_LOGO_OPTION: &str = "branding_use_custom_logo";

/// Fetch the header logo, store it verbatim and enable custom branding.
pub struct SetBranding;

#[async_trait]
impl Step for SetBranding {
    fn name(&self) -> &'static str {
        "set_branding"
    }

    async fn execute(&self, cx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
        let Some(url) = cx
            .config
            .branding
            .as_ref()
            .and_then(|b| b.header_url.as_deref())
        else {
            return Ok(StepOutcome::Skipped("no branding configured".into()));
        };
        let db = cx.db(self.name())?;

        let bytes = cx.adapters.fetcher.fetch(url).await?;
        cx.adapters
            .assets
            .store_asset(Asset::HeaderLogo, &bytes)
            .await?;
        db.set_option(CUSTOM_LOGO_OPTION, "1").await?;
        info!(url, bytes = bytes.len(), "Header logo stored");
        Ok(StepOutcome::Applied)
    }
}
