use std::fmt;
use std::path::PathBuf;

use checkhost::CheckMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator of the persisted key string `mode|target|location|metric`
pub const KEY_DELIMITER: char = '|';

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("failed to read baseline file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse baseline file {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },

    #[error("failed to serialize baselines: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write baseline file {path}: {source}")]
    Persistence { path: PathBuf, source: std::io::Error },
}

/// Identifies one statistical model
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BaselineKey {
    pub mode: CheckMode,
    /// Normalised target, see `CheckSpec::target`
    pub target: String,
    /// "Country, City" of the probing node
    pub location: String,
    pub metric: String,
}

impl BaselineKey {
    pub fn new(
        mode: CheckMode,
        target: impl Into<String>,
        location: impl Into<String>,
        metric: impl Into<String>,
    ) -> Self {
        Self { mode, target: target.into(), location: location.into(), metric: metric.into() }
    }

    /// Persisted form: `mode|target|location|metric`
    pub fn encode(&self) -> String {
        format!(
            "{}{d}{}{d}{}{d}{}",
            self.mode,
            self.target,
            self.location,
            self.metric,
            d = KEY_DELIMITER
        )
    }

    /// Parse the persisted form.
    ///
    /// Mode is the first field, location and metric the last two; whatever is
    /// left in between is the target, so a target containing the delimiter
    /// still round-trips.
    pub fn decode(encoded: &str) -> Option<Self> {
        let (mode, rest) = encoded.split_once(KEY_DELIMITER)?;
        let (rest, metric) = rest.rsplit_once(KEY_DELIMITER)?;
        let (target, location) = rest.rsplit_once(KEY_DELIMITER)?;

        if target.is_empty() || metric.is_empty() {
            return None;
        }

        Some(Self::new(mode.parse().ok()?, target, location, metric))
    }
}

impl fmt::Display for BaselineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Running statistics for one key
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecord {
    /// Number of samples folded in
    pub n: u64,
    pub mean: f64,
    /// Sum of squared deviations from the running mean
    pub m2: f64,
}

impl BaselineRecord {
    pub fn new(n: u64, mean: f64, m2: f64) -> Self {
        Self { n, mean, m2 }
    }

    /// Fold one observation in (Welford)
    pub fn update(&mut self, value: f64) {
        let delta = value - self.mean;
        self.n += 1;
        self.mean += delta / self.n as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// Population variance; zero until two samples exist
    pub fn variance(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        (self.m2 / self.n as f64).max(0.0)
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Finite values and a non-negative m2
    pub fn is_valid(&self) -> bool {
        self.mean.is_finite() && self.m2.is_finite() && self.m2 >= 0.0
    }
}
