mod anomaly;
mod baseline;
mod config;
mod error;
mod monitoring;
mod stats;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use checkhost::{CheckHostClient, CheckMode};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::baseline::{BaselineStore, storage};
use crate::monitoring::{CheckReport, ExecutorSettings, MonitoringExecutor, MonitoringScheduler};

/// Reports buffered between the scheduler and the alert logger
const REPORT_BUFFER: usize = 32;

/// hostwatch - distributed reachability monitor with learned baselines
#[derive(Parser)]
#[command(name = "hostwatch")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every configured target on a fixed interval until interrupted
    Run,
    /// Run a single check now and print the report; baselines are read, not updated
    Check {
        /// http, ping or tcp
        mode: CheckMode,
        /// URL for http, host for ping and tcp
        target: String,
        /// Port for tcp checks
        port: Option<u16>,
    },
    /// Print learned baselines
    Stats {
        #[arg(short, long)]
        mode: Option<CheckMode>,
        #[arg(short, long)]
        target: Option<String>,
        #[arg(long, default_value_t = stats::DEFAULT_MAX_ROWS)]
        max_rows: usize,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init_tracing();

    let cli = Cli::parse();
    let config = config::Config::from_config(cli.config.as_ref()).context("failed to load config")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config).await,
        Commands::Check { mode, target, port } => {
            // Only a running `hostwatch run` owns the baseline file
            let settings = ExecutorSettings { read_only: true, ..config.executor_settings() };
            let scheduler = build_scheduler(&config, settings, mpsc::channel(1).0).await?;
            let cancel = CancellationToken::new();
            let report = scheduler.run_on_demand(mode, &target, port, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Stats { mode, target, max_rows } => {
            let snapshot = storage::load(&config.baseline.path).await?;
            let rows = stats::stats_rows(&snapshot, mode, target.as_deref(), max_rows);
            println!("{}", serde_json::to_string_pretty(&rows)?);
            Ok(())
        }
        Commands::Config => {
            println!("{}", config);
            Ok(())
        }
    }
}

/// Load baselines and wire provider, executor and scheduler together
async fn build_scheduler(
    config: &config::Config,
    settings: ExecutorSettings,
    report_tx: mpsc::Sender<CheckReport>,
) -> anyhow::Result<Arc<MonitoringScheduler>> {
    let records = match storage::load(&config.baseline.path).await {
        Ok(records) => records,
        Err(e) => {
            warn!("Starting with empty baselines: {}", e);
            Default::default()
        }
    };
    info!(entries = records.len(), path = %config.baseline.path.display(), "Baselines loaded");

    let provider =
        CheckHostClient::new(&config.provider.base_url, config.provider.request_timeout_seconds)
            .context("failed to build provider client")?;
    let store = Arc::new(BaselineStore::with_records(records));
    let executor = Arc::new(MonitoringExecutor::new(Arc::new(provider), store, settings));

    Ok(Arc::new(MonitoringScheduler::new(executor, report_tx)))
}

async fn run(config: &config::Config) -> anyhow::Result<()> {
    let targets = config.target_specs()?;
    if targets.is_empty() {
        warn!("No targets configured, nothing to monitor");
        return Ok(());
    }

    let (report_tx, mut report_rx) = mpsc::channel::<CheckReport>(REPORT_BUFFER);
    let scheduler = build_scheduler(config, config.executor_settings(), report_tx).await?;

    let consumer = tokio::spawn(async move {
        while let Some(report) = report_rx.recv().await {
            info!(
                check = %report.spec,
                nodes = report.observations.len(),
                failed = report.failed_nodes(),
                complete = report.complete,
                "Check report"
            );
            for (record, verdict) in report.anomalies() {
                warn!(
                    check = %report.spec,
                    location = %record.location,
                    metric = %verdict.key.metric,
                    observed = verdict.observed,
                    factor = ?verdict.factor,
                    z = ?verdict.z,
                    "Anomaly: {}",
                    verdict.classification
                );
            }
        }
    });

    let cancel = CancellationToken::new();
    let handle = scheduler.schedule(targets, config.interval(), cancel.clone());
    info!(interval_seconds = config.monitor.interval_seconds, "Monitoring started");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
    cancel.cancel();

    if let Err(e) = handle.await {
        error!("Scheduler task failed: {}", e);
    }
    scheduler.executor().persist().await;

    // Dropping the last sender closes the channel so the consumer drains and exits
    drop(scheduler);
    if let Err(e) = consumer.await {
        error!("Report consumer failed: {}", e);
    }

    Ok(())
}
