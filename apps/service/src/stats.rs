//! Flattened baseline view for the stats table.

use std::collections::BTreeMap;

use checkhost::CheckMode;
use serde::Serialize;

use crate::baseline::{BaselineKey, BaselineRecord};

/// Row cap used when the caller has no preference
pub const DEFAULT_MAX_ROWS: usize = 80;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRow {
    pub mode: CheckMode,
    pub target: String,
    pub location: String,
    pub metric: String,
    pub n: u64,
    pub mean: f64,
    pub std: f64,
}

/// Rows of `snapshot` in key order, optionally filtered by mode and target
pub fn stats_rows(
    snapshot: &BTreeMap<BaselineKey, BaselineRecord>,
    mode: Option<CheckMode>,
    target: Option<&str>,
    max_rows: usize,
) -> Vec<StatsRow> {
    snapshot
        .iter()
        .filter(|(key, _)| mode.is_none_or(|mode| key.mode == mode))
        .filter(|(key, _)| target.is_none_or(|target| key.target == target))
        .take(max_rows)
        .map(|(key, record)| StatsRow {
            mode: key.mode,
            target: key.target.clone(),
            location: key.location.clone(),
            metric: key.metric.clone(),
            n: record.n,
            mean: record.mean,
            std: record.std_dev(),
        })
        .collect()
}
