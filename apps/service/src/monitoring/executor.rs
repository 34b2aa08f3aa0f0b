use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use checkhost::{CheckProvider, CheckSpec, PollOptions, poll};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::metrics;
use super::normalizer::normalize;
use super::types::{CheckReport, MeasurementRecord, Observation};
use crate::anomaly::{AnomalyVerdict, MetricKind, Thresholds};
use crate::baseline::{BaselineKey, BaselineStore, UpdatePolicy};
use crate::error::MonitorError;

/// Knobs for a single check run
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub max_nodes: u32,
    pub poll: PollOptions,
    pub thresholds: Thresholds,
    pub update_policy: UpdatePolicy,
    /// Where baselines are written after each check; `None` keeps them in memory
    pub baseline_path: Option<PathBuf>,
    /// Classify against the store without updating or persisting it
    pub read_only: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_nodes: checkhost::DEFAULT_MAX_NODES,
            poll: PollOptions::default(),
            thresholds: Thresholds::default(),
            update_policy: UpdatePolicy::default(),
            baseline_path: None,
            read_only: false,
        }
    }
}

/// Monitoring executor - runs one check end to end
///
/// submit -> poll -> normalize -> classify + update -> persist
pub struct MonitoringExecutor {
    provider: Arc<dyn CheckProvider>,
    store: Arc<BaselineStore>,
    settings: ExecutorSettings,
}

impl MonitoringExecutor {
    pub fn new(
        provider: Arc<dyn CheckProvider>,
        store: Arc<BaselineStore>,
        settings: ExecutorSettings,
    ) -> Self {
        Self { provider, store, settings }
    }

    pub fn store(&self) -> &Arc<BaselineStore> {
        &self.store
    }

    /// Run `spec` once
    ///
    /// Nodes that never answered are absent from the report. Provider
    /// failures are returned; a failed baseline write is only logged.
    pub async fn execute_check(
        &self,
        spec: &CheckSpec,
        cancel: &CancellationToken,
    ) -> Result<CheckReport, MonitorError> {
        let started_at = Utc::now();

        let request = self.provider.submit(spec, self.settings.max_nodes).await?;
        let outcome = poll(self.provider.as_ref(), &request, self.settings.poll, cancel).await?;

        let observations: Vec<Observation> = outcome
            .results
            .iter()
            .map(|(node_id, raw)| {
                let record = normalize(spec, node_id, request.nodes.get(node_id), raw);
                let verdicts = self.evaluate(&record);
                Observation { record, verdicts }
            })
            .collect();

        let report = CheckReport {
            spec: spec.clone(),
            started_at,
            complete: outcome.complete,
            observations,
        };

        info!(
            check = %spec,
            nodes = report.observations.len(),
            dispatched = request.nodes.len(),
            failed = report.failed_nodes(),
            anomalies = report.anomalies().count(),
            "Check finished"
        );
        for (record, verdict) in report.alerts() {
            warn!(
                check = %spec,
                location = %record.location,
                node = %record.node,
                metric = %verdict.key.metric,
                observed = verdict.observed,
                mean = verdict.baseline.mean,
                std = verdict.baseline.std,
                samples = verdict.baseline.n,
                "{}",
                verdict.classification
            );
        }

        self.persist().await;
        Ok(report)
    }

    /// Classify and fold in every baselined metric of `record`
    fn evaluate(&self, record: &MeasurementRecord) -> Vec<AnomalyVerdict> {
        record
            .metrics
            .iter()
            .filter(|(name, _)| metrics::is_baselined(name))
            .filter_map(|(name, &value)| {
                let kind = MetricKind::for_metric(name);
                // Timings of a failed or lossy node are not representative
                if kind == MetricKind::Magnitude && !record.success {
                    return None;
                }
                if !value.is_finite() {
                    warn!(node = %record.node, metric = %name, "Ignoring non-finite measurement");
                    return None;
                }

                let key = BaselineKey::new(record.mode, &record.target, &record.location, name);
                let thresholds = &self.settings.thresholds;
                let verdict = if self.settings.read_only {
                    self.store.assess(key, value, kind, thresholds)
                } else {
                    self.store.observe(key, value, kind, thresholds, self.settings.update_policy)
                };
                Some(verdict)
            })
            .collect()
    }

    /// Write baselines if a path is configured
    pub async fn persist(&self) {
        if self.settings.read_only {
            return;
        }
        let Some(path) = &self.settings.baseline_path else {
            return;
        };

        match self.store.persist(path).await {
            Ok(()) => debug!(path = %path.display(), "Baselines persisted"),
            Err(e) => warn!("Failed to persist baselines, will retry after the next check: {}", e),
        }
    }
}
