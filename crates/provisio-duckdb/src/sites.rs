use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::info;

use provisio_target::{SiteRecord, SiteStore, Superuser};

use crate::DuckDbTarget;

/// Generate a site ID: "site_" + 10 random alphanumeric chars.
fn generate_site_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let chars: String = (0..10)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect();
    format!("site_{}", chars)
}

/// Render a whole-hour UTC offset the way the sites table stores it.
pub fn timezone_for_offset(offset_hours: i32) -> String {
    match offset_hours {
        0 => "UTC".to_string(),
        h if h > 0 => format!("UTC+{h}"),
        h => format!("UTC{h}"),
    }
}

#[async_trait]
impl SiteStore for DuckDbTarget {
    async fn list_sites(&self) -> Result<Vec<SiteRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, name, url, timezone FROM {} ORDER BY created_at, id",
            self.tables.sites
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(SiteRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                url: row.get(2)?,
                timezone: row.get(3)?,
            })
        })?;

        let mut sites = Vec::new();
        for row in rows {
            sites.push(row?);
        }
        Ok(sites)
    }

    async fn create_site(
        &self,
        su: &Superuser,
        name: &str,
        url: &str,
        timezone_offset: i32,
    ) -> Result<SiteRecord> {
        if name.trim().is_empty() {
            bail!("site name cannot be empty");
        }
        if !(-12..=14).contains(&timezone_offset) {
            bail!("timezone offset {timezone_offset} is out of range");
        }
        let site = SiteRecord {
            id: generate_site_id(),
            name: name.to_string(),
            url: url.to_string(),
            timezone: timezone_for_offset(timezone_offset),
        };
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO {} (id, name, url, timezone, created_at) \
                 VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP)",
                self.tables.sites
            ),
            duckdb::params![site.id, site.name, site.url, site.timezone],
        )?;
        info!(site_id = %site.id, name, granted_by = su.issuer(), "Site created");
        Ok(site)
    }
}
