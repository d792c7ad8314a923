use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::{debug, info};

use provisio_core::config::DatabaseSettings;
use provisio_core::ProvisionError;
use provisio_target::{Connector, Database, PluginSettingsStore};

use crate::schema::Tables;

/// `dbname` value that selects an in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Argon2id memory cost in KB used when hashing account passwords.
pub const DEFAULT_ARGON2_MEMORY_KB: u32 = 65536;

/// Opens [`DuckDbTarget`] connections for a local install.
///
/// Only the `duckdb` adapter kind is understood. The database file lives at
/// `<document_root>/data/<dbname>.duckdb`; `host` and credentials are
/// accepted for parity with networked adapters and otherwise ignored.
#[derive(Debug, Clone)]
pub struct DuckDbConnector {
    document_root: PathBuf,
    argon2_memory_kb: u32,
}

impl DuckDbConnector {
    pub fn new(document_root: impl Into<PathBuf>) -> Self {
        Self {
            document_root: document_root.into(),
            argon2_memory_kb: DEFAULT_ARGON2_MEMORY_KB,
        }
    }

    pub fn with_argon2_memory_kb(mut self, kb: u32) -> Self {
        self.argon2_memory_kb = kb;
        self
    }

    pub fn database_path(&self, dbname: &str) -> PathBuf {
        self.document_root
            .join("data")
            .join(format!("{dbname}.duckdb"))
    }

    /// Open the database described by `settings` without going through the
    /// [`Connector`] trait object.
    pub fn open(&self, settings: &DatabaseSettings) -> Result<DuckDbTarget, ProvisionError> {
        if settings.adapter != "duckdb" {
            return Err(ProvisionError::InvalidConfig(format!(
                "unsupported database adapter {:?} (expected \"duckdb\")",
                settings.adapter
            )));
        }
        let tables = Tables::new(&settings.tables_prefix)?;
        if !settings.host.is_empty() {
            debug!(host = %settings.host, "DuckDB ignores database.host");
        }

        let conn = if settings.dbname == IN_MEMORY {
            Connection::open_in_memory()
                .map_err(|e| ProvisionError::TransientConnectivity(e.to_string()))?
        } else {
            let path = self.database_path(&settings.dbname);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            // A file held by another process fails here with a lock error.
            let conn = Connection::open(&path)
                .map_err(|e| ProvisionError::TransientConnectivity(e.to_string()))?;
            info!(path = %path.display(), "DuckDB opened");
            conn
        };
        conn.execute_batch("SELECT 1")
            .map_err(|e| ProvisionError::TransientConnectivity(e.to_string()))?;

        Ok(DuckDbTarget {
            conn: Arc::new(Mutex::new(conn)),
            tables,
            document_root: self.document_root.clone(),
            charset: settings.charset.clone(),
            argon2_memory_kb: self.argon2_memory_kb,
        })
    }
}

#[async_trait]
impl Connector for DuckDbConnector {
    async fn connect(
        &self,
        settings: &DatabaseSettings,
    ) -> Result<Box<dyn Database>, ProvisionError> {
        Ok(Box::new(self.open(settings)?))
    }
}

/// A connected local install backed by DuckDB.
///
/// The connection sits behind `Arc<Mutex<_>>` so every adapter method takes
/// `&self` and writes are serialised.
pub struct DuckDbTarget {
    pub(crate) conn: Arc<Mutex<Connection>>,
    pub(crate) tables: Tables,
    pub(crate) document_root: PathBuf,
    pub(crate) charset: Option<String>,
    pub(crate) argon2_memory_kb: u32,
}

impl DuckDbTarget {
    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn document_root(&self) -> &Path {
        &self.document_root
    }

    /// Execute `SELECT 1` as a liveness check.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// Acquire the connection lock for direct queries.
    ///
    /// Intended for integration tests that need to verify stored data.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    pub(crate) async fn table_exists(&self, table: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .prepare(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = 'main' AND table_name = ?1",
            )?
            .query_row(duckdb::params![table], |row| row.get(0))?;
        Ok(count > 0)
    }
}

fn is_utf8_charset(charset: &str) -> bool {
    let normalized = charset.to_ascii_lowercase().replace('-', "");
    normalized == "utf8" || normalized == "utf8mb4"
}

#[async_trait]
impl Database for DuckDbTarget {
    /// DuckDB always stores UTF-8; only an explicitly configured foreign
    /// charset makes the connection count as non-UTF-8.
    async fn connection_is_utf8(&self) -> Result<bool> {
        self.ping().await?;
        Ok(self.charset.as_deref().map_or(true, is_utf8_charset))
    }

    async fn plugin_settings<'a>(&'a self) -> Result<Option<&'a dyn PluginSettingsStore>> {
        if self.table_exists(&self.tables.plugin_settings).await? {
            Ok(Some(self as &dyn PluginSettingsStore))
        } else {
            Ok(None)
        }
    }
}
