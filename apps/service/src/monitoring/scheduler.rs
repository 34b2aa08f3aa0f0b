use std::sync::Arc;
use std::time::Duration;

use checkhost::{CheckMode, CheckSpec};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::executor::MonitoringExecutor;
use super::types::CheckReport;
use crate::error::MonitorError;

/// Monitoring scheduler - drives periodic and on-demand checks
///
/// Both paths share one executor and therefore one baseline store.
pub struct MonitoringScheduler {
    executor: Arc<MonitoringExecutor>,
    report_tx: mpsc::Sender<CheckReport>,
}

impl MonitoringScheduler {
    /// Create a new monitoring scheduler
    pub fn new(executor: Arc<MonitoringExecutor>, report_tx: mpsc::Sender<CheckReport>) -> Self {
        Self { executor, report_tx }
    }

    pub fn executor(&self) -> &Arc<MonitoringExecutor> {
        &self.executor
    }

    /// Run every target once, in order
    ///
    /// A failing target is logged and skipped. Returns how many targets
    /// produced a report.
    pub async fn run_cycle(&self, targets: &[CheckSpec], cancel: &CancellationToken) -> usize {
        let mut completed = 0;

        for spec in targets {
            if cancel.is_cancelled() {
                break;
            }

            match self.executor.execute_check(spec, cancel).await {
                Ok(report) => {
                    completed += 1;
                    if self.report_tx.send(report).await.is_err() {
                        debug!(check = %spec, "No report consumer, dropping report");
                    }
                }
                Err(e) if e.is_cancelled() => break,
                Err(e) => warn!(check = %spec, "Check failed, skipping this cycle: {}", e),
            }
        }

        completed
    }

    /// Spawn the periodic loop; it stops when `cancel` fires
    pub fn schedule(
        self: &Arc<Self>,
        targets: Vec<CheckSpec>,
        every: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();

        tokio::spawn(async move {
            let mut timer = interval(every);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = timer.tick() => {}
                }

                info!(targets = targets.len(), "Starting monitoring cycle");
                let completed = scheduler.run_cycle(&targets, &cancel).await;
                info!(completed, targets = targets.len(), "Monitoring cycle done");
            }

            info!("Monitoring scheduler stopped");
        })
    }

    /// Run one check outside the periodic cadence
    ///
    /// The report goes back to the caller rather than to the report channel.
    pub async fn run_on_demand(
        &self,
        mode: CheckMode,
        target: &str,
        port: Option<u16>,
        cancel: &CancellationToken,
    ) -> Result<CheckReport, MonitorError> {
        let spec = CheckSpec::new(mode, target, port)?;
        info!(check = %spec, "Running on-demand check");
        self.executor.execute_check(&spec, cancel).await
    }
}
