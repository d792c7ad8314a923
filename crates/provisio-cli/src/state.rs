use std::path::Path;
use std::sync::Arc;

use provisio_core::config::RunSettings;
use provisio_core::document::PersistedConfig;
use provisio_core::retry::Backoff;
use provisio_core::{ProvisionConfig, ProvisionError};
use provisio_duckdb::{DuckDbConnector, LocalInstall};
use provisio_target::{AssetStore, CacheInvalidator, Connector, Database, Diagnostics};

use crate::fetch::{Fetcher, HttpFetcher};

/// Everything the steps talk to before a database connection exists.
pub struct Adapters {
    pub connector: Box<dyn Connector>,
    pub diagnostics: Box<dyn Diagnostics>,
    pub caches: Box<dyn CacheInvalidator>,
    pub assets: Box<dyn AssetStore>,
    pub fetcher: Box<dyn Fetcher>,
}

impl Adapters {
    /// Adapters for a DuckDB-backed install on the local filesystem.
    pub fn local(document_root: &Path, settings: &RunSettings) -> Result<Self, ProvisionError> {
        let install = LocalInstall::new(document_root);
        Ok(Self {
            connector: Box::new(DuckDbConnector::new(document_root)),
            diagnostics: Box::new(install.clone()),
            caches: Box::new(install.clone()),
            assets: Box::new(install),
            fetcher: Box::new(HttpFetcher::new(settings.fetch_timeout())?),
        })
    }
}

/// State threaded through every step of a run.
///
/// The config is behind an `Arc` so steps can hold it while mutating the
/// rest of the context; nothing hands out a mutable reference to it.
pub struct StepContext {
    pub config: Arc<ProvisionConfig>,
    pub persisted: PersistedConfig,
    pub adapters: Adapters,
    pub db_retry: Backoff,
    db: Option<Box<dyn Database>>,
}

impl StepContext {
    pub fn new(
        config: ProvisionConfig,
        persisted: PersistedConfig,
        adapters: Adapters,
        db_retry: Backoff,
    ) -> Self {
        Self {
            config: Arc::new(config),
            persisted,
            adapters,
            db_retry,
            db: None,
        }
    }

    /// The live database, or [`ProvisionError::OutOfOrder`] when `step` runs
    /// before the connect step.
    pub fn db(&self, step: &'static str) -> Result<&dyn Database, ProvisionError> {
        self.db.as_deref().ok_or(ProvisionError::OutOfOrder {
            step,
            requirement: "a database connection",
        })
    }

    pub fn is_connected(&self) -> bool {
        self.db.is_some()
    }

    pub(crate) fn attach_database(&mut self, db: Box<dyn Database>) {
        self.db = Some(db);
    }
}
