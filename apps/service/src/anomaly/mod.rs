//! Anomaly classification.
//!
//! A fresh observation is compared with the baseline as it was *before* the
//! observation is folded in. Classification is a pure function; all state
//! lives in the baseline store.

pub mod classifier;
pub mod types;

pub use classifier::classify;
pub use types::{AnomalyVerdict, BaselineSnapshot, Classification, MetricKind, Thresholds};
