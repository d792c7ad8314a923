use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use provisio_core::config::DatabaseSettings;
use provisio_core::document::{Section, DATABASE, GENERAL};
use provisio_core::secret::rand_hex;
use provisio_core::ProvisionError;

use crate::state::StepContext;
use crate::workflow::{Step, StepOutcome};

/// Persist connection settings, connect with bounded retry and make sure the
/// persisted charset is UTF-8.
pub struct ConnectDatabase;

fn database_section(settings: &DatabaseSettings) -> Result<Section, ProvisionError> {
    match serde_json::to_value(settings)? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(ProvisionError::InvalidConfig(format!(
            "database settings serialized to {other}"
        ))),
    }
}

#[async_trait]
impl Step for ConnectDatabase {
    fn name(&self) -> &'static str {
        "connect_database"
    }

    async fn execute(&self, cx: &mut StepContext) -> Result<StepOutcome, ProvisionError> {
        let config = Arc::clone(&cx.config);

        if let Some(handler) = &config.session_save_handler {
            cx.persisted
                .set(GENERAL, "session_save_handler", json!(handler));
        }
        // Only the first run generates a salt.
        if cx.persisted.get(GENERAL, "salt").is_none() {
            cx.persisted.set(GENERAL, "salt", json!(rand_hex(16)));
        }
        cx.persisted
            .set(GENERAL, "installation_in_progress", json!(1));
        cx.persisted
            .replace_section(DATABASE, database_section(&config.database)?);

        let connector = cx.adapters.connector.as_ref();
        let settings = &config.database;
        let db = cx
            .db_retry
            .retry("database connect", move |attempt| {
                debug!(attempt, dbname = %settings.dbname, "Connecting to database");
                connector.connect(settings)
            })
            .await?;

        if !db.connection_is_utf8().await? {
            warn!("Database connection is not UTF-8, forcing charset=utf8");
            cx.persisted.set(DATABASE, "charset", json!("utf8"));
        }
        cx.persisted.commit()?;
        cx.attach_database(db);
        info!(adapter = %settings.adapter, "Database connected");
        Ok(StepOutcome::Applied)
    }
}
