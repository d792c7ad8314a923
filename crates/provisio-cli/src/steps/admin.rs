use async_trait::async_trait;
use tracing::info;

use provisio_core::ProvisionError;

use crate::state::StepContext;
use crate::workflow::{Step, StepOutcome};

pub struct CreateAdminUser;

#[async_trait]
impl Step for CreateAdminUser {
    fn name(&self) -> &'static str {
        "create_admin_user"
    }

    async fn execute(&self, cx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
        let config = &cx.config;
        let db = cx.db(self.name())?;

        if db.user_exists(&config.login).await? || db.user_email_exists(&config.email).await? {
            info!(login = %config.login, "Admin user already exists");
            return Ok(StepOutcome::AlreadySatisfied);
        }

        let su = db.elevate().await?;
        db.create_user(&su, &config.login, config.password.expose(), &config.email)
            .await?;
        db.grant_superuser(&su, &config.login).await?;
        info!(login = %config.login, "Admin user created");
        Ok(StepOutcome::Applied)
    }
}
