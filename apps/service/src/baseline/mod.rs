/// Baseline modeling
///
/// One running mean/variance model per (mode, target, location, metric),
/// updated online with Welford's algorithm and persisted as a JSON map.
pub mod storage;
pub mod store;
pub mod types;

pub use store::{BaselineStore, UpdatePolicy};
pub use types::{BaselineError, BaselineKey, BaselineRecord};
