use serde::{Deserialize, Serialize};

use crate::baseline::{BaselineKey, BaselineRecord};
use crate::monitoring::metrics;

/// Which rule family applies to a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Packet loss ratio
    Loss,
    /// Durations: HTTP time, TCP connect time, ping RTT
    Magnitude,
}

impl MetricKind {
    pub fn for_metric(metric: &str) -> Self {
        if metric == metrics::LOSS { MetricKind::Loss } else { MetricKind::Magnitude }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Normal,
    /// Some loss, below the anomaly bar
    LossDetected,
    LossAnomaly,
    /// RTT or response time spike
    RttAnomaly,
}

impl Classification {
    pub fn is_anomaly(&self) -> bool {
        matches!(self, Classification::LossAnomaly | Classification::RttAnomaly)
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Normal => write!(f, "normal"),
            Classification::LossDetected => write!(f, "loss detected"),
            Classification::LossAnomaly => write!(f, "loss anomaly"),
            Classification::RttAnomaly => write!(f, "rtt anomaly"),
        }
    }
}

/// Decision thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// No anomaly is raised for a key with fewer samples
    pub min_samples: u64,
    /// Minimum z-score for a magnitude anomaly
    pub sigma: f64,
    /// Minimum observed/mean ratio for a magnitude anomaly
    pub factor: f64,
    /// Baseline loss ratio must be at or below this for a loss anomaly
    pub loss_baseline_max: f64,
    /// Observed loss ratio at or above this is a loss anomaly
    pub loss_absolute: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_samples: 20,
            sigma: 3.0,
            factor: 2.0,
            loss_baseline_max: 0.05,
            loss_absolute: 0.10,
        }
    }
}

/// Baseline state an observation was judged against
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineSnapshot {
    pub n: u64,
    pub mean: f64,
    pub std: f64,
}

impl From<&BaselineRecord> for BaselineSnapshot {
    fn from(record: &BaselineRecord) -> Self {
        Self { n: record.n, mean: record.mean, std: record.std_dev() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub key: BaselineKey,
    pub observed: f64,
    pub baseline: BaselineSnapshot,
    pub classification: Classification,
    /// observed / mean, when the mean is positive
    pub factor: Option<f64>,
    /// (observed - mean) / std, when std is positive
    pub z: Option<f64>,
}
