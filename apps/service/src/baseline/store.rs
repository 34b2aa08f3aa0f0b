use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::storage;
use super::types::{BaselineError, BaselineKey, BaselineRecord};
use crate::anomaly::{AnomalyVerdict, MetricKind, Thresholds, classify};

/// Whether observations classified as anomalies are folded into the baseline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    /// Every observation updates the baseline, letting it adapt
    #[default]
    Always,
    /// Anomalous observations leave the baseline untouched
    SkipAnomalies,
}

/// In-memory baseline models shared by the scheduler and on-demand checks
///
/// All access goes through one mutex. `observe` holds it across the
/// classify and update steps so two observations for the same key never
/// read the same stale baseline.
#[derive(Debug, Default)]
pub struct BaselineStore {
    records: Mutex<BTreeMap<BaselineKey, BaselineRecord>>,
    /// Orders writers of the baseline file
    persist_lock: tokio::sync::Mutex<()>,
}

impl BaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: BTreeMap<BaselineKey, BaselineRecord>) -> Self {
        Self { records: Mutex::new(records), persist_lock: tokio::sync::Mutex::new(()) }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<BaselineKey, BaselineRecord>> {
        // Records are plain data; a panic elsewhere cannot leave them half-updated
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current record for `key`, or the zero record
    pub fn get(&self, key: &BaselineKey) -> BaselineRecord {
        self.lock().get(key).copied().unwrap_or_default()
    }

    /// Fold `value` into the model for `key`, returning the updated record
    pub fn update(&self, key: &BaselineKey, value: f64) -> BaselineRecord {
        let mut records = self.lock();
        let record = records.entry(key.clone()).or_default();
        record.update(value);
        *record
    }

    /// Classify `value` against the current baseline, then update it
    ///
    /// Both steps happen under the same lock.
    pub fn observe(
        &self,
        key: BaselineKey,
        value: f64,
        kind: MetricKind,
        thresholds: &Thresholds,
        policy: UpdatePolicy,
    ) -> AnomalyVerdict {
        let mut records = self.lock();
        let baseline = records.get(&key).copied().unwrap_or_default();
        let verdict = classify(&key, value, &baseline, kind, thresholds);

        let skip = policy == UpdatePolicy::SkipAnomalies && verdict.classification.is_anomaly();
        if skip {
            debug!(key = %key, value, "Anomalous sample kept out of baseline");
        } else {
            records.entry(key).or_default().update(value);
        }

        verdict
    }

    /// Classify `value` against the current baseline without changing it
    pub fn assess(
        &self,
        key: BaselineKey,
        value: f64,
        kind: MetricKind,
        thresholds: &Thresholds,
    ) -> AnomalyVerdict {
        let baseline = self.get(&key);
        classify(&key, value, &baseline, kind, thresholds)
    }

    /// Copy of every record
    pub fn snapshot(&self) -> BTreeMap<BaselineKey, BaselineRecord> {
        self.lock().clone()
    }

    /// Replace all records at once
    pub fn load(&self, records: BTreeMap<BaselineKey, BaselineRecord>) {
        *self.lock() = records;
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Write the current state to `path`
    ///
    /// On failure the in-memory state is untouched and the next call
    /// writes everything again.
    pub async fn persist(&self, path: &Path) -> Result<(), BaselineError> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.snapshot();
        storage::save(path, &snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::anomaly::Classification;
    use checkhost::CheckMode;
    use tempfile::tempdir;

    fn rtt_key() -> BaselineKey {
        BaselineKey::new(CheckMode::Ping, "example.com", "Germany, Frankfurt", "rtt_avg")
    }

    #[test]
    fn get_absent_key_is_zero_record() {
        let store = BaselineStore::new();
        assert_eq!(store.get(&rtt_key()), BaselineRecord::new(0, 0.0, 0.0));
        assert!(store.is_empty());
    }

    #[test]
    fn update_returns_post_update_record() {
        let store = BaselineStore::new();
        let key = rtt_key();

        let first = store.update(&key, 2.0);
        assert_eq!(first, BaselineRecord::new(1, 2.0, 0.0));

        let second = store.update(&key, 4.0);
        assert_eq!(second.n, 2);
        assert_eq!(second.mean, 3.0);
        assert_eq!(second.m2, 2.0);
        assert_eq!(store.get(&key), second);
    }

    #[test]
    fn assess_leaves_baseline_unchanged() {
        let store = BaselineStore::new();
        let key = rtt_key();
        for _ in 0..20 {
            store.update(&key, 0.1);
        }
        let before = store.get(&key);

        let verdict = store.assess(key.clone(), 0.5, MetricKind::Magnitude, &Thresholds::default());

        assert_eq!(verdict.classification, Classification::RttAnomaly);
        assert_eq!(verdict.baseline.n, 20);
        assert_eq!(store.get(&key), before);
    }

    #[test]
    fn observe_classifies_against_pre_update_baseline() {
        let store = BaselineStore::new();
        let key = rtt_key();
        for _ in 0..20 {
            store.update(&key, 0.1);
        }

        let verdict = store.observe(
            key.clone(),
            0.5,
            MetricKind::Magnitude,
            &Thresholds::default(),
            UpdatePolicy::Always,
        );

        assert_eq!(verdict.classification, Classification::RttAnomaly);
        assert_eq!(verdict.baseline.n, 20);
        assert_eq!(store.get(&key).n, 21);
    }

    #[test]
    fn skip_anomalies_policy_keeps_baseline() {
        let store = BaselineStore::new();
        let key = rtt_key();
        for _ in 0..20 {
            store.update(&key, 0.1);
        }
        let before = store.get(&key);

        let verdict = store.observe(
            key.clone(),
            0.5,
            MetricKind::Magnitude,
            &Thresholds::default(),
            UpdatePolicy::SkipAnomalies,
        );
        assert!(verdict.classification.is_anomaly());
        assert_eq!(store.get(&key), before);

        store.observe(
            key.clone(),
            0.1,
            MetricKind::Magnitude,
            &Thresholds::default(),
            UpdatePolicy::SkipAnomalies,
        );
        assert_eq!(store.get(&key).n, 21);
    }

    #[test]
    fn load_replaces_everything() {
        let store = BaselineStore::new();
        store.update(&rtt_key(), 1.0);

        let other = BaselineKey::new(CheckMode::Http, "https://example.com", "USA, Dallas", "time");
        let mut records = BTreeMap::new();
        records.insert(other.clone(), BaselineRecord::new(5, 0.3, 0.01));
        store.load(records.clone());

        assert_eq!(store.snapshot(), records);
        assert_eq!(store.get(&rtt_key()).n, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_observations_never_lose_samples() {
        let store = Arc::new(BaselineStore::new());
        let key = rtt_key();

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let store = store.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    store.observe(
                        key,
                        0.1 + (i % 4) as f64 * 0.01,
                        MetricKind::Magnitude,
                        &Thresholds::default(),
                        UpdatePolicy::Always,
                    )
                })
            })
            .collect();

        let mut seen_n = Vec::new();
        for handle in handles {
            seen_n.push(handle.await.unwrap().baseline.n);
        }

        // Each observation saw a distinct pre-update count
        seen_n.sort_unstable();
        assert_eq!(seen_n, (0..64).collect::<Vec<u64>>());
        assert_eq!(store.get(&key).n, 64);
    }

    #[tokio::test]
    async fn test_persist_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.json");

        let store = BaselineStore::new();
        for value in [0.1, 0.12, 0.09] {
            store.update(&rtt_key(), value);
        }
        store.persist(&path).await.unwrap();

        let restored = BaselineStore::new();
        restored.load(storage::load(&path).await.unwrap());
        assert_eq!(restored.snapshot(), store.snapshot());
    }
}
