use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use uuid::Uuid;

use provisio_cli::{Adapters, Provisioner, StepContext, StepStatus};
use provisio_core::config::{LogFormat, RunSettings};
use provisio_core::document::PersistedConfig;
use provisio_core::ProvisionConfig;
use provisio_duckdb::LocalInstall;

#[derive(Parser)]
#[command(name = "provisio")]
#[command(version)]
#[command(
    about = "Provision a self-hosted web analytics install from a JSON description",
    long_about = None
)]
struct Cli {
    /// Provisioning document
    #[arg(default_value = "install.json")]
    config: PathBuf,
}

fn init_tracing(format: LogFormat) -> Result<()> {
    // Level controlled via RUST_LOG.
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("provisio=info".parse()?);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = RunSettings::from_env()?;
    init_tracing(settings.log_format)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    runtime.block_on(run(cli, settings))
}

async fn run(cli: Cli, settings: RunSettings) -> Result<()> {
    let run_id = Uuid::new_v4();
    info!(%run_id, config = %cli.config.display(), "Running provisioning");

    let config = ProvisionConfig::load(&cli.config)?;
    let install = LocalInstall::new(&config.document_root);
    let persisted = PersistedConfig::open(Box::new(install.config_file()))?;
    let adapters = Adapters::local(&config.document_root, &settings)?;
    let cx = StepContext::new(config, persisted, adapters, settings.db_retry.clone());

    let mut provisioner = Provisioner::new(cx);
    let result = provisioner.run().await;

    for record in provisioner.log() {
        match &record.status {
            StepStatus::Completed(outcome) => info!(
                step = record.step,
                outcome = %outcome,
                elapsed_ms = record.elapsed_ms(),
                "Summary"
            ),
            StepStatus::Failed(message) => error!(
                step = record.step,
                error = %message,
                elapsed_ms = record.elapsed_ms(),
                "Summary"
            ),
        }
    }

    result.with_context(|| format!("provisioning run {run_id} failed"))?;
    info!(%run_id, "Provisioning complete");
    Ok(())
}
