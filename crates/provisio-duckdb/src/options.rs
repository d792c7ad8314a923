use anyhow::Result;
use async_trait::async_trait;

use provisio_target::OptionStore;

use crate::DuckDbTarget;

#[async_trait]
impl OptionStore for DuckDbTarget {
    async fn set_option(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO {} (key, value) VALUES (?1, ?2) \
                 ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
                self.tables.options
            ),
            duckdb::params![key, value],
        )?;
        Ok(())
    }

    async fn get_option(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let result = conn
            .prepare(&format!(
                "SELECT value FROM {} WHERE key = ?1",
                self.tables.options
            ))?
            .query_row(duckdb::params![key], |row| row.get::<_, String>(0))
            .ok();
        Ok(result)
    }
}
