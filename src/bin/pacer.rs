//! CLI binary for the backup pacer.
//!
//! `run` keeps the schedule current until Ctrl-C, `status` prints the risk
//! breakdown and schedule snapshot as JSON on stdout, and `sync` runs one
//! sync immediately.
//! Tracing output goes to stderr.

use anyhow::Context;
use backup_pacer::daemon::PacerDaemon;
use backup_pacer::status::status_report;
use backup_pacer::sync::FaultRecordingInvoker;
use backup_pacer::{
    CommandSyncInvoker, DirectoryInventory, FaultLedger, PacerConfig, ScheduleController,
    SyncInvoker,
};
use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Backup pacer: schedules backup syncs by risk.
#[derive(Parser)]
#[command(name = "backup-pacer", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Poll inventories and keep the sync timer current.
    Run,

    /// Print the risk breakdown and the schedule it would arm as JSON.
    Status {
        /// Recent sync faults to score.
        #[arg(long, default_value_t = 0)]
        faults: u32,

        /// Hours since the last backup.
        #[arg(long, default_value_t = 0.0)]
        hours: f64,
    },

    /// Run one sync now.
    Sync,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("backup_pacer=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => PacerConfig::from_file(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => {
            let path = PacerConfig::default_config_path();
            if path.exists() {
                PacerConfig::from_file(&path)?
            } else {
                PacerConfig::default()
            }
        }
    };

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Status { faults, hours } => status(&config, faults, hours),
        Command::Sync => sync_now(&config).await,
    }
}

fn inventory(config: &PacerConfig) -> DirectoryInventory {
    DirectoryInventory::new(
        config.inventory.source_dir.clone(),
        config.inventory.backup_dir.clone(),
    )
    .with_recursive(config.inventory.recursive)
}

async fn run(config: PacerConfig) -> anyhow::Result<()> {
    let ledger = FaultLedger::new(config.schedule.fault_window());
    let invoker: Arc<dyn SyncInvoker> = Arc::new(FaultRecordingInvoker::new(
        CommandSyncInvoker::from_config(&config.sync),
        ledger.clone(),
    ));
    let controller = ScheduleController::new(Arc::clone(&invoker))
        .with_next_backup_format(config.schedule.next_backup_format.clone());

    let cancel = CancellationToken::new();
    let daemon = PacerDaemon::new(
        controller.clone(),
        Arc::new(inventory(&config)),
        Arc::new(ledger),
        invoker,
        cancel.child_token(),
    )
    .with_poll_interval(config.schedule.poll_interval())
    .with_bootstrap_retry(config.schedule.fault_window());
    let task = tokio::spawn(daemon.run());

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for Ctrl-C")?;
    info!(
        next_backup = %controller.next_backup_time(),
        "shutdown requested"
    );
    cancel.cancel();
    task.await.context("pacer task panicked")?;
    Ok(())
}

fn status(config: &PacerConfig, faults: u32, hours: f64) -> anyhow::Result<()> {
    anyhow::ensure!(
        hours.is_finite() && hours >= 0.0,
        "--hours must be a non-negative number, got {hours}"
    );
    let last_backup_at = TimeDelta::try_milliseconds((hours * 3_600_000.0) as i64)
        .and_then(|since| Utc::now().checked_sub_signed(since))
        .context("--hours is out of range")?;
    let controller = ScheduleController::new(Arc::new(CommandSyncInvoker::from_config(
        &config.sync,
    )))
    .with_next_backup_format(config.schedule.next_backup_format.clone())
    .with_last_backup_at(last_backup_at);

    let report = status_report(&controller, &inventory(config), faults);
    controller.shutdown();

    println!("{}", serde_json::to_string_pretty(&report?)?);
    Ok(())
}

async fn sync_now(config: &PacerConfig) -> anyhow::Result<()> {
    let report = CommandSyncInvoker::from_config(&config.sync).sync().await?;
    println!("Sync finished in {:.1}s", report.elapsed.as_secs_f64());
    if !report.detail.is_empty() {
        println!("{}", report.detail);
    }
    Ok(())
}
