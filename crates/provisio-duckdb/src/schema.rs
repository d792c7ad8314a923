use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use provisio_core::ProvisionError;
use provisio_target::{SchemaStore, Superuser};

use crate::users::GUEST_LOGIN;
use crate::DuckDbTarget;

/// Table names with the configured `tables_prefix` applied.
///
/// The prefix is interpolated into SQL, so [`Tables::new`] only accepts
/// ASCII letters, digits and underscores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub prefix: String,
    pub users: String,
    pub sites: String,
    pub options: String,
    pub plugins: String,
    pub plugin_settings: String,
    pub migrations: String,
}

impl Tables {
    pub fn new(prefix: &str) -> Result<Self, ProvisionError> {
        if !prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ProvisionError::InvalidConfig(format!(
                "tables_prefix {prefix:?} may only contain letters, digits and '_'"
            )));
        }
        let name = |table: &str| format!("{prefix}{table}");
        Ok(Self {
            prefix: prefix.to_string(),
            users: name("users"),
            sites: name("sites"),
            options: name("options"),
            plugins: name("plugins"),
            plugin_settings: name("plugin_settings"),
            migrations: name("migrations"),
        })
    }

    /// Every table this target may create, including upgrade-created ones.
    pub fn all(&self) -> [&str; 6] {
        [
            &self.users,
            &self.sites,
            &self.options,
            &self.plugins,
            &self.plugin_settings,
            &self.migrations,
        ]
    }
}

/// Base schema created on a fresh install.
///
/// Every statement uses `IF NOT EXISTS` so a retried creation after a crash
/// mid-batch finishes the job instead of failing.
pub fn schema_sql(t: &Tables) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {migrations} (
    id          VARCHAR PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- Accounts. password_hash is empty for the guest account.
CREATE TABLE IF NOT EXISTS {users} (
    login           VARCHAR PRIMARY KEY,
    password_hash   VARCHAR NOT NULL,
    email           VARCHAR NOT NULL,
    superuser       BOOLEAN NOT NULL DEFAULT false,
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS {sites} (
    id              VARCHAR PRIMARY KEY,           -- 'site_' + 10 random chars
    name            VARCHAR NOT NULL,
    url             VARCHAR NOT NULL,
    timezone        VARCHAR(16) NOT NULL DEFAULT 'UTC',
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS {options} (
    key             VARCHAR PRIMARY KEY,
    value           VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS {plugins} (
    name            VARCHAR PRIMARY KEY,
    activated       BOOLEAN NOT NULL DEFAULT false,
    installed       BOOLEAN NOT NULL DEFAULT false,
    updated_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
        migrations = t.migrations,
        users = t.users,
        sites = t.sites,
        options = t.options,
        plugins = t.plugins,
    )
}

/// Numbered component upgrades, applied in order and recorded in the
/// migrations table so each runs once.
pub fn upgrades(t: &Tables) -> Vec<(&'static str, String)> {
    vec![
        (
            "core-1.1.0-plugin-settings",
            format!(
                r#"CREATE TABLE IF NOT EXISTS {plugin_settings} (
    plugin_name     VARCHAR NOT NULL,
    setting_name    VARCHAR NOT NULL,
    json_value      VARCHAR NOT NULL,
    updated_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (plugin_name, setting_name)
);"#,
                plugin_settings = t.plugin_settings
            ),
        ),
        (
            "core-1.2.0-users-email-index",
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{prefix}users_email ON {users}(email);",
                prefix = t.prefix,
                users = t.users
            ),
        ),
    ]
}

impl DuckDbTarget {
    /// Apply every upgrade not yet recorded, each in its own transaction.
    pub(crate) async fn run_upgrades(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.lock().await;
        let mut applied = Vec::new();
        for (id, sql) in upgrades(&self.tables) {
            let done: i64 = conn
                .prepare(&format!(
                    "SELECT COUNT(*) FROM {} WHERE id = ?1",
                    self.tables.migrations
                ))?
                .query_row(duckdb::params![id], |row| row.get(0))?;
            if done > 0 {
                continue;
            }
            let tx = conn.transaction()?;
            tx.execute_batch(&sql)?;
            tx.execute(
                &format!(
                    "INSERT INTO {} (id, applied_at) VALUES (?1, CURRENT_TIMESTAMP)",
                    self.tables.migrations
                ),
                duckdb::params![id],
            )?;
            tx.commit()?;
            info!(upgrade = id, "Applied component upgrade");
            applied.push(id.to_string());
        }
        Ok(applied)
    }
}

#[async_trait]
impl SchemaStore for DuckDbTarget {
    async fn tables_installed(&self) -> Result<BTreeSet<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = 'main'",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let known = self.tables.all();
        let mut installed = BTreeSet::new();
        for row in rows {
            let name = row?;
            if known.contains(&name.as_str()) {
                installed.insert(name);
            }
        }
        Ok(installed)
    }

    async fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch(&schema_sql(&self.tables))?;
        Ok(())
    }

    async fn create_guest_account(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO {} (login, password_hash, email, superuser, created_at) \
                 VALUES (?1, '', 'anonymous@example.org', false, CURRENT_TIMESTAMP) \
                 ON CONFLICT (login) DO NOTHING",
                self.tables.users
            ),
            duckdb::params![GUEST_LOGIN],
        )?;
        Ok(())
    }

    async fn apply_pending_upgrades(&self, su: &Superuser) -> Result<Vec<String>> {
        tracing::debug!(issuer = su.issuer(), "Applying pending upgrades");
        self.run_upgrades().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_applied_to_every_table() {
        let tables = Tables::new("pw_").expect("valid prefix");
        assert!(tables.all().iter().all(|name| name.starts_with("pw_")));
        assert_eq!(tables.users, "pw_users");
    }

    #[test]
    fn empty_prefix_is_allowed() {
        let tables = Tables::new("").expect("valid prefix");
        assert_eq!(tables.migrations, "migrations");
    }

    #[test]
    fn rejects_prefix_with_sql_metacharacters() {
        assert!(Tables::new("a-b").is_err());
        assert!(Tables::new("x;").is_err());
        assert!(Tables::new("p\"").is_err());
    }

    #[test]
    fn upgrade_ids_are_unique() {
        let tables = Tables::new("").expect("valid prefix");
        let ids: BTreeSet<_> = upgrades(&tables).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids.len(), upgrades(&tables).len());
    }
}
