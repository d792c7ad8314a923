//! Filesystem side of a local install: caches, assets, diagnostics and the
//! JSON config file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use provisio_core::document::{ConfigBackend, ConfigDocument};
use provisio_target::{Asset, AssetStore, CacheInvalidator, DiagnosticResult, Diagnostics};

/// Remove everything inside `dir`, leaving the (possibly new) empty directory.
pub(crate) async fn clear_dir_contents(dir: &Path) -> Result<()> {
    if tokio::fs::try_exists(dir).await.unwrap_or(false) {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("read {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let removed = if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            removed.with_context(|| format!("remove {}", path.display()))?;
        }
    }
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create {}", dir.display()))?;
    debug!(dir = %dir.display(), "Cache directory cleared");
    Ok(())
}

async fn probe_writable(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let probe = dir.join(".provisio-write-test");
    tokio::fs::write(&probe, b"ok").await?;
    tokio::fs::remove_file(&probe).await
}

/// The files of a target install rooted at `document_root`.
#[derive(Debug, Clone)]
pub struct LocalInstall {
    document_root: PathBuf,
}

impl LocalInstall {
    pub fn new(document_root: impl Into<PathBuf>) -> Self {
        Self {
            document_root: document_root.into(),
        }
    }

    pub fn document_root(&self) -> &Path {
        &self.document_root
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.document_root.join("tmp")
    }

    pub fn config_path(&self) -> PathBuf {
        self.document_root.join("config").join("config.json")
    }

    pub fn asset_path(&self, asset: Asset) -> PathBuf {
        self.document_root.join(asset.relative_path())
    }

    pub fn config_file(&self) -> JsonConfigFile {
        JsonConfigFile::new(self.config_path())
    }
}

#[async_trait]
impl CacheInvalidator for LocalInstall {
    async fn clear_derived_caches(&self) -> Result<()> {
        clear_dir_contents(&self.tmp_dir()).await
    }
}

#[async_trait]
impl AssetStore for LocalInstall {
    async fn store_asset(&self, asset: Asset, bytes: &[u8]) -> Result<()> {
        let path = self.asset_path(asset);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl Diagnostics for LocalInstall {
    async fn run_all(&self) -> Result<Vec<DiagnosticResult>> {
        let mut results = Vec::new();

        let root_ok = tokio::fs::metadata(&self.document_root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        results.push(if root_ok {
            DiagnosticResult::ok("document root")
        } else {
            DiagnosticResult::error(
                "document root",
                format!("{} is not a directory", self.document_root.display()),
            )
        });

        for (label, dir) in [
            ("tmp directory writable", self.tmp_dir()),
            ("config directory writable", self.document_root.join("config")),
        ] {
            results.push(match probe_writable(&dir).await {
                Ok(()) => DiagnosticResult::ok(label),
                Err(e) => DiagnosticResult::error(label, format!("{}: {e}", dir.display())),
            });
        }

        let plugins_dir = self.document_root.join("plugins");
        let plugins_ok = tokio::fs::metadata(&plugins_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        results.push(if plugins_ok {
            DiagnosticResult::ok("plugins directory")
        } else {
            DiagnosticResult::warning(
                "plugins directory",
                format!("{} is missing; no plugin can be activated", plugins_dir.display()),
            )
        });

        Ok(results)
    }
}

/// Config document stored as pretty-printed JSON.
///
/// Saves go through a sibling temp file and a rename, so a crash never
/// leaves a half-written config behind.
#[derive(Debug, Clone)]
pub struct JsonConfigFile {
    path: PathBuf,
}

impl JsonConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigBackend for JsonConfigFile {
    fn load(&self) -> Result<ConfigDocument> {
        if !self.path.exists() {
            return Ok(ConfigDocument::default());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {}", self.path.display()))
    }

    fn save(&self, document: &ConfigDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(document)?;
        std::fs::write(&tmp, body).with_context(|| format!("write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace {}", self.path.display()))?;
        Ok(())
    }
}
