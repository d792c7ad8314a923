use async_trait::async_trait;
use tracing::info;

use provisio_core::ProvisionError;

use crate::state::StepContext;
use crate::workflow::{Step, StepOutcome};

pub const LOCATION_PROVIDER: &str = "usercountry.location_provider";

/// Provider that reads the legacy GeoIP databases and needs download URLs.
pub const GEOIP_PECL: &str = "geoip_pecl";

const GEOIP_DEFAULTS: [(&str, &str); 4] = [
    ("geoip.isp_db_url", ""),
    (
        "geoip.loc_db_url",
        "http://geolite.maxmind.com/download/geoip/database/GeoLiteCity.dat.gz",
    ),
    ("geoip.org_db_url", ""),
    ("geoip.updater_period", "month"),
];

pub struct SetGeoProvider;

#[async_trait]
impl Step for SetGeoProvider {
    fn name(&self) -> &'static str {
        "set_geo_provider"
    }

    async fn execute(&self, cx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
        let Some(provider) = cx.config.geo_provider.as_deref() else {
            return Ok(StepOutcome::Skipped("no geo_provider configured".into()));
        };
        let db = cx.db(self.name())?;

        db.set_option(LOCATION_PROVIDER, provider).await?;
        if provider == GEOIP_PECL {
            for (key, value) in GEOIP_DEFAULTS {
                db.set_option(key, value).await?;
            }
        }
        info!(provider, "Geolocation provider set");
        Ok(StepOutcome::Applied)
    }
}
