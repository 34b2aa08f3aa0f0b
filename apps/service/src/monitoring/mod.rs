/// Monitoring engine module - runs checks through the remote provider
///
/// This module is responsible for:
/// - Turning per-node provider results into measurement records
/// - Judging each measurement against its baseline
/// - Running every configured target on a fixed interval
/// - Running single checks on demand through the same pipeline
pub mod executor;
pub mod normalizer;
pub mod scheduler;
pub mod types;


pub use executor::{ExecutorSettings, MonitoringExecutor};
pub use scheduler::MonitoringScheduler;
pub use types::{CheckReport, MeasurementRecord, Observation};

/// Metric names carried by measurement records
pub mod metrics {
    /// HTTP response time or TCP connect time, seconds
    pub const TIME: &str = "time";
    /// Mean RTT of successful ping replies, seconds
    pub const RTT_AVG: &str = "rtt_avg";
    pub const RTT_MIN: &str = "rtt_min";
    pub const RTT_MAX: &str = "rtt_max";
    /// Ping loss ratio, 0.0 to 1.0
    pub const LOSS: &str = "loss";

    /// Metrics that get a baseline model
    pub fn is_baselined(metric: &str) -> bool {
        matches!(metric, TIME | RTT_AVG | LOSS)
    }
}
