use async_trait::async_trait;
use tracing::info;

use provisio_core::ProvisionError;

use crate::state::StepContext;
use crate::workflow::{Step, StepOutcome};

pub const IP_ANONYMIZER_ENABLED: &str = "PrivacyManager.ipAnonymizerEnabled";
pub const IP_ADDRESS_MASK_LENGTH: &str = "PrivacyManager.ipAddressMaskLength";
pub const DO_NOT_TRACK_ENABLED: &str = "PrivacyManager.doNotTrackEnabled";

/// Bytes masked off visitor IPs when anonymization is on.
const DEFAULT_MASK_LENGTH: &str = "2";

fn flag(enabled: bool) -> &'static str {
    if enabled {
        "1"
    } else {
        "0"
    }
}

pub struct SetPrivacy;

#[async_trait]
impl Step for SetPrivacy {
    fn name(&self) -> &'static str {
        "set_privacy"
    }

    async fn execute(&self, cx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
        let Some(privacy) = cx.config.privacy.as_ref() else {
            return Ok(StepOutcome::Skipped("no privacy settings configured".into()));
        };
        if privacy.anonymize_ip.is_none() && privacy.honor_do_not_track.is_none() {
            return Ok(StepOutcome::Skipped("privacy section is empty".into()));
        }
        let db = cx.db(self.name())?;

        if let Some(anonymize) = privacy.anonymize_ip {
            db.set_option(IP_ANONYMIZER_ENABLED, flag(anonymize)).await?;
            if anonymize {
                db.set_option(IP_ADDRESS_MASK_LENGTH, DEFAULT_MASK_LENGTH)
                    .await?;
            }
        }
        if let Some(dnt) = privacy.honor_do_not_track {
            db.set_option(DO_NOT_TRACK_ENABLED, flag(dnt)).await?;
        }
        info!(
            anonymize_ip = ?privacy.anonymize_ip,
            honor_do_not_track = ?privacy.honor_do_not_track,
            "Privacy rules set"
        );
        Ok(StepOutcome::Applied)
    }
}
