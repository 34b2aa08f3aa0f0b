use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use checkhost::{CheckMode, CheckSpec};
use serde::{Deserialize, Serialize};

use crate::anomaly::AnomalyVerdict;

/// Ping reply counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyCount {
    pub ok: usize,
    pub total: usize,
}

/// Canonical result of one node for one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub mode: CheckMode,
    /// Normalised target
    pub target: String,
    /// Node host name
    pub node: String,
    /// "Country, City" of the node
    pub location: String,
    pub success: bool,
    pub metrics: BTreeMap<String, f64>,
    pub resolved_ip: Option<String>,
    pub error_message: Option<String>,

    /// HTTP status text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    /// HTTP status code as reported by the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replies: Option<ReplyCount>,
}

impl MeasurementRecord {
    /// Empty, unsuccessful record for `node`
    pub fn new(spec: &CheckSpec, node: &str, location: String) -> Self {
        Self {
            mode: spec.mode(),
            target: spec.target().to_string(),
            node: node.to_string(),
            location,
            success: false,
            metrics: BTreeMap::new(),
            resolved_ip: None,
            error_message: None,
            status_text: None,
            status_code: None,
            replies: None,
        }
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Mark the record failed with a diagnostic
    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.metrics.clear();
        self.error_message = Some(error.into());
        self
    }
}

/// A record and the verdicts for its baselined metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub record: MeasurementRecord,
    pub verdicts: Vec<AnomalyVerdict>,
}

/// Everything one check produced, handed to the alerting side
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub spec: CheckSpec,
    pub started_at: DateTime<Utc>,
    /// Every dispatched node answered before polling stopped
    pub complete: bool,
    /// One entry per answering node, ordered by node name
    pub observations: Vec<Observation>,
}

impl CheckReport {
    /// Verdicts that are anomalies, with their records
    pub fn anomalies(&self) -> impl Iterator<Item = (&MeasurementRecord, &AnomalyVerdict)> {
        self.alerts().filter(|(_, verdict)| verdict.classification.is_anomaly())
    }

    /// Every verdict that is not `Normal`, with its record
    pub fn alerts(&self) -> impl Iterator<Item = (&MeasurementRecord, &AnomalyVerdict)> {
        self.observations.iter().flat_map(|obs| {
            obs.verdicts
                .iter()
                .filter(|verdict| verdict.classification != crate::anomaly::Classification::Normal)
                .map(move |verdict| (&obs.record, verdict))
        })
    }

    pub fn failed_nodes(&self) -> usize {
        self.observations.iter().filter(|obs| !obs.record.success).count()
    }
}
