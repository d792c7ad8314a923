use std::collections::BTreeMap;

use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;
use serde_json::json;

use provisio_core::config::DatabaseSettings;
use provisio_core::ProvisionError;
use provisio_duckdb::backend::IN_MEMORY;
use provisio_duckdb::{DuckDbConnector, DuckDbTarget};
use provisio_target::{
    Connector, Database, OptionStore, PluginManager, SchemaStore, SiteStore, UserStore,
};

fn settings(dbname: &str, prefix: &str) -> DatabaseSettings {
    DatabaseSettings {
        host: "localhost".to_string(),
        adapter: "duckdb".to_string(),
        dbname: dbname.to_string(),
        tables_prefix: prefix.to_string(),
        ..DatabaseSettings::default()
    }
}

fn connector(root: &std::path::Path) -> DuckDbConnector {
    DuckDbConnector::new(root).with_argon2_memory_kb(1024)
}

async fn installed(root: &std::path::Path, prefix: &str) -> DuckDbTarget {
    let target = connector(root)
        .open(&settings(IN_MEMORY, prefix))
        .expect("open in-memory");
    target.create_tables().await.expect("create tables");
    target.create_guest_account().await.expect("guest");
    let su = target.elevate().await.expect("elevate");
    target.apply_pending_upgrades(&su).await.expect("upgrades");
    target
}

// ============================================================
// BDD: Schema creation and component upgrades
// ============================================================
#[tokio::test]
async fn test_fresh_database_has_no_tables() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = connector(dir.path())
        .open(&settings(IN_MEMORY, ""))
        .expect("open");
    assert!(target.tables_installed().await.expect("tables").is_empty());
}

#[tokio::test]
async fn test_prefixed_tables_are_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = installed(dir.path(), "pw_").await;
    let tables = target.tables_installed().await.expect("tables");
    assert!(tables.contains("pw_users"));
    assert!(tables.contains("pw_plugin_settings"));
    assert!(tables.iter().all(|t| t.starts_with("pw_")));
}

#[tokio::test]
async fn test_upgrades_apply_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = installed(dir.path(), "").await;
    assert!(target
        .trigger_core_update()
        .await
        .expect("second update")
        .is_empty());
}

#[tokio::test]
async fn test_plugin_settings_capability_appears_after_upgrade() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = connector(dir.path())
        .open(&settings(IN_MEMORY, ""))
        .expect("open");
    target.create_tables().await.expect("create tables");
    assert!(target.plugin_settings().await.expect("probe").is_none());

    target.trigger_core_update().await.expect("update");
    let store = target
        .plugin_settings()
        .await
        .expect("probe")
        .expect("capability present");

    let mut values = BTreeMap::new();
    values.insert("threshold".to_string(), json!(5));
    store
        .save_plugin_settings("Heatmaps", &values)
        .await
        .expect("save");
    values.insert("threshold".to_string(), json!(7));
    store
        .save_plugin_settings("Heatmaps", &values)
        .await
        .expect("overwrite");

    let stored = target.load_plugin_settings("Heatmaps").await.expect("load");
    assert_eq!(stored.get("threshold"), Some(&json!(7)));
}

// ============================================================
// BDD: Users, sites and options
// ============================================================
#[tokio::test]
async fn test_guest_account_is_seeded_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = installed(dir.path(), "").await;
    target.create_guest_account().await.expect("second seed");
    assert!(target.user_exists("anonymous").await.expect("exists"));

    let conn = target.conn_for_test().await;
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .expect("count users");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_admin_user_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = installed(dir.path(), "").await;
    let su = target.elevate().await.expect("elevate");

    target
        .create_user(&su, "admin", "s3cret-pass", "Admin@Example.org")
        .await
        .expect("create user");
    target.grant_superuser(&su, "admin").await.expect("grant");

    assert!(target.user_exists("admin").await.expect("exists"));
    assert!(target
        .user_email_exists("admin@example.org")
        .await
        .expect("email"));
    assert!(target.is_superuser("admin").await.expect("superuser"));
    let hash = target
        .password_hash("admin")
        .await
        .expect("hash")
        .expect("stored");
    assert!(hash.starts_with("$argon2id$"));
    assert!(!hash.contains("s3cret-pass"));
    let parsed = PasswordHash::new(&hash).expect("phc string");
    assert!(Argon2::default()
        .verify_password(b"s3cret-pass", &parsed)
        .is_ok());
    assert!(Argon2::default()
        .verify_password(b"wrong-pass", &parsed)
        .is_err());
}

#[tokio::test]
async fn test_duplicate_user_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = installed(dir.path(), "").await;
    let su = target.elevate().await.expect("elevate");
    target
        .create_user(&su, "admin", "pw", "a@example.org")
        .await
        .expect("first");
    assert!(target
        .create_user(&su, "admin", "pw", "b@example.org")
        .await
        .is_err());
}

#[tokio::test]
async fn test_grant_superuser_requires_existing_user() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = installed(dir.path(), "").await;
    let su = target.elevate().await.expect("elevate");
    assert!(target.grant_superuser(&su, "ghost").await.is_err());
}

#[tokio::test]
async fn test_site_creation_and_listing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = installed(dir.path(), "").await;
    let su = target.elevate().await.expect("elevate");

    let site = target
        .create_site(&su, "Docs", "https://docs.example.org", 0)
        .await
        .expect("create site");
    assert!(site.id.starts_with("site_"));
    assert_eq!(site.timezone, "UTC");

    let sites = target.list_sites().await.expect("list");
    assert_eq!(sites, vec![site]);
}

#[tokio::test]
async fn test_options_overwrite() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = installed(dir.path(), "").await;
    assert_eq!(target.get_option("missing").await.expect("get"), None);

    target.set_option("geoip.updater_period", "week").await.expect("set");
    target.set_option("geoip.updater_period", "month").await.expect("set");
    assert_eq!(
        target.get_option("geoip.updater_period").await.expect("get"),
        Some("month".to_string())
    );
}

// ============================================================
// BDD: Plugin lifecycle
// ============================================================
#[tokio::test]
async fn test_plugin_activation_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir_all(dir.path().join("plugins/Heatmaps")).expect("plugin dir");
    let target = installed(dir.path(), "").await;

    assert!(target.activate("Heatmaps").await.expect("activate"));
    assert!(!target.activate("Heatmaps").await.expect("re-activate"));
    assert_eq!(
        target.install_activated().await.expect("install"),
        vec!["Heatmaps".to_string()]
    );

    assert!(target.deactivate("Heatmaps").await.expect("deactivate"));
    assert!(!target.deactivate("Heatmaps").await.expect("re-deactivate"));
    assert!(target.install_activated().await.expect("install").is_empty());
}

#[tokio::test]
async fn test_unknown_plugin_cannot_be_activated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = installed(dir.path(), "").await;
    assert!(target.activate("NoSuchPlugin").await.is_err());
}

#[tokio::test]
async fn test_clear_caches_recreates_cache_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = dir.path().join("tmp/cache");
    std::fs::create_dir_all(cache.join("plugins")).expect("mkdir");
    std::fs::write(cache.join("plugins/list.json"), "[]").expect("write");
    let target = installed(dir.path(), "").await;

    target.clear_caches().await.expect("clear");

    assert!(cache.is_dir());
    assert_eq!(std::fs::read_dir(&cache).expect("read").count(), 0);
}

// ============================================================
// BDD: Connector behaviour
// ============================================================
#[tokio::test]
async fn test_file_database_persists_across_connections() {
    let dir = tempfile::tempdir().expect("tempdir");
    let connector = connector(dir.path());
    {
        let db = connector
            .connect(&settings("analytics", "pw_"))
            .await
            .expect("connect");
        db.create_tables().await.expect("create");
        db.set_option("k", "v").await.expect("set");
    }
    assert!(dir.path().join("data/analytics.duckdb").exists());

    let db = connector
        .connect(&settings("analytics", "pw_"))
        .await
        .expect("reconnect");
    assert!(!db.tables_installed().await.expect("tables").is_empty());
    assert_eq!(db.get_option("k").await.expect("get"), Some("v".to_string()));
}

#[tokio::test]
async fn test_connector_rejects_other_adapters() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut mysql = settings("analytics", "");
    mysql.adapter = "PDO\\MYSQL".to_string();
    let result = connector(dir.path()).connect(&mysql).await;
    assert!(matches!(result, Err(ProvisionError::InvalidConfig(_))));
}
