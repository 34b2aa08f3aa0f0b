//! Baseline file persistence.
//!
//! The file is a JSON object mapping `mode|target|location|metric` to
//! `{"n", "mean", "m2"}`. Writes go to a sibling `.tmp` file that is synced
//! and then renamed over the real one, so a crash never leaves a
//! half-written file. Floats are parsed with `float_roundtrip`, so a reload
//! reproduces every bit.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::types::{BaselineError, BaselineKey, BaselineRecord};

/// Default baseline file, relative to the working directory
pub const DEFAULT_BASELINE_FILE: &str = "monitor_stats.json";

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Serialize a snapshot into the persisted format
pub fn to_json(snapshot: &BTreeMap<BaselineKey, BaselineRecord>) -> Result<String, BaselineError> {
    let encoded: BTreeMap<String, &BaselineRecord> =
        snapshot.iter().map(|(key, record)| (key.encode(), record)).collect();
    Ok(serde_json::to_string_pretty(&encoded)?)
}

/// Parse the persisted format, skipping entries that do not decode
pub fn from_json(raw: &str) -> Result<BTreeMap<BaselineKey, BaselineRecord>, serde_json::Error> {
    let encoded: BTreeMap<String, BaselineRecord> = serde_json::from_str(raw)?;

    let mut records = BTreeMap::new();
    for (raw_key, record) in encoded {
        match BaselineKey::decode(&raw_key) {
            Some(key) if record.is_valid() => {
                records.insert(key, record);
            }
            Some(_) => warn!(key = %raw_key, "Skipping baseline with invalid statistics"),
            None => warn!(key = %raw_key, "Skipping baseline with unparsable key"),
        }
    }
    Ok(records)
}

/// Write `bytes` to a fresh file and flush it to disk before returning
async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

async fn remove_stale(temp: &Path) {
    match tokio::fs::remove_file(temp).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %temp.display(), "Failed to remove temporary baseline file: {}", e),
    }
}

/// Write a snapshot atomically
pub async fn save(
    path: &Path,
    snapshot: &BTreeMap<BaselineKey, BaselineRecord>,
) -> Result<(), BaselineError> {
    let content = to_json(snapshot)?;
    let temp = temp_path(path);
    let write_err = |source| BaselineError::Persistence { path: path.to_path_buf(), source };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    if let Err(source) = write_synced(&temp, content.as_bytes()).await {
        remove_stale(&temp).await;
        return Err(write_err(source));
    }
    if let Err(source) = tokio::fs::rename(&temp, path).await {
        remove_stale(&temp).await;
        return Err(write_err(source));
    }

    debug!(path = %path.display(), baselines = snapshot.len(), "Saved baselines");
    Ok(())
}

/// Read a snapshot; a missing file is an empty snapshot
pub async fn load(path: &Path) -> Result<BTreeMap<BaselineKey, BaselineRecord>, BaselineError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => return Err(BaselineError::Read { path: path.to_path_buf(), source }),
    };

    from_json(&raw).map_err(|source| BaselineError::Parse { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkhost::CheckMode;
    use tempfile::tempdir;

    fn sample_snapshot() -> BTreeMap<BaselineKey, BaselineRecord> {
        let mut snapshot = BTreeMap::new();
        snapshot.insert(
            BaselineKey::new(CheckMode::Ping, "example.com", "Germany, Frankfurt", "rtt_avg"),
            BaselineRecord::new(42, 0.031_415_926_535_897_93, 0.000_123_456_789),
        );
        snapshot.insert(
            BaselineKey::new(CheckMode::Ping, "example.com", "Germany, Frankfurt", "loss"),
            BaselineRecord::new(42, 0.1 / 3.0, 0.9),
        );
        snapshot.insert(
            BaselineKey::new(CheckMode::Tcp, "example.com:443", "Japan, Tokyo", "time"),
            BaselineRecord::new(1, 0.2, 0.0),
        );
        snapshot
    }

    #[tokio::test]
    async fn test_save_then_load_reproduces_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("stats.json");
        let snapshot = sample_snapshot();

        save(&path, &snapshot).await.unwrap();
        let loaded = load(&path).await.unwrap();

        assert_eq!(loaded, snapshot);
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_load_then_save_is_byte_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.json");

        save(&path, &sample_snapshot()).await.unwrap();
        let first = std::fs::read(&path).unwrap();

        let loaded = load(&path).await.unwrap();
        save(&path, &loaded).await.unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let loaded = load(&dir.path().join("absent.json")).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(load(&path).await, Err(BaselineError::Parse { .. })));
    }

    #[test]
    fn unparsable_entries_are_skipped() {
        let raw = r#"{
            "ping|example.com|Germany, Frankfurt|loss": {"n": 3, "mean": 0.0, "m2": 0.0},
            "gopher|example.com|Germany, Frankfurt|loss": {"n": 3, "mean": 0.0, "m2": 0.0},
            "ping|example.com|Japan, Tokyo|rtt_avg": {"n": 3, "mean": 0.1, "m2": -1.0}
        }"#;

        let loaded = from_json(raw).unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn test_unwritable_path_reports_persistence_error() {
        let dir = tempdir().unwrap();
        // A directory where the file should be
        let path = dir.path().join("stats.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let err = save(&path, &sample_snapshot()).await.unwrap_err();
        assert!(matches!(err, BaselineError::Persistence { .. }));
        // The temporary file was written, then the rename failed
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_welford_statistics_survive_reload_exactly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.json");

        // Deterministic pseudo-random latencies between 1 ms and ~1 s
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % 1_000_000) as f64 / 1_000_003.0 + 0.001
        };

        let mut snapshot = BTreeMap::new();
        for target in 0..40 {
            let mut record = BaselineRecord::default();
            for _ in 0..(1 + target * 7) {
                record.update(next());
            }
            let key = BaselineKey::new(
                CheckMode::Ping,
                format!("host-{target}.example.com"),
                "Germany, Frankfurt",
                "rtt_avg",
            );
            snapshot.insert(key, record);
        }

        save(&path, &snapshot).await.unwrap();
        let loaded = load(&path).await.unwrap();
        assert_eq!(loaded, snapshot);

        for (key, record) in &snapshot {
            let reloaded = loaded[key];
            assert_eq!(reloaded.mean.to_bits(), record.mean.to_bits(), "{key}");
            assert_eq!(reloaded.m2.to_bits(), record.m2.to_bits(), "{key}");
        }
    }
}
