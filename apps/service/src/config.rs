use std::{env, fmt, fs, path, time::Duration};

use checkhost::{CheckMode, CheckSpec, PollOptions, SpecError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::anomaly::Thresholds;
use crate::baseline::UpdatePolicy;
use crate::baseline::storage::DEFAULT_BASELINE_FILE;
use crate::monitoring::ExecutorSettings;

/// TCP port used when a tcp target does not name one
const DEFAULT_TCP_PORT: u16 = 443;

/// Appended to a config written without targets
const TARGETS_EXAMPLE: &str = r#"
# No targets are configured yet, so `hostwatch run` has nothing to check.
# Add one [[targets]] table per endpoint, for example:
#
# [[targets]]
# host = "https://example.com"
# mode = "http"
#
# [[targets]]
# host = "example.com"
# mode = "ping"
#
# [[targets]]
# host = "example.com"
# mode = "tcp"
# port = 443
"#;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: std::io::Error },
    #[error("failed to write config {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: std::io::Error },
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config directory: neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("invalid target {host} ({mode}): {source}")]
    InvalidTarget { host: String, mode: CheckMode, source: SpecError },
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: Monitor,
    pub provider: Provider,
    pub baseline: Baseline,
    pub thresholds: Thresholds,
    pub targets: Vec<Target>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Monitor {
    /// Seconds between monitoring cycles
    pub interval_seconds: u64,
    /// Nodes requested from the provider per check
    pub max_nodes: u32,
    pub update_policy: UpdatePolicy,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Provider {
    pub base_url: String,
    pub request_timeout_seconds: u64,
    pub poll_attempts: u32,
    pub poll_interval_seconds: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Baseline {
    pub path: path::PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    pub mode: CheckMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            interval_seconds: 600,
            max_nodes: checkhost::DEFAULT_MAX_NODES,
            update_policy: UpdatePolicy::default(),
        }
    }
}

impl Default for Provider {
    fn default() -> Self {
        Self {
            base_url: checkhost::DEFAULT_BASE_URL.into(),
            request_timeout_seconds: 15,
            poll_attempts: 10,
            poll_interval_seconds: 2.0,
        }
    }
}

impl Default for Baseline {
    fn default() -> Self {
        Self { path: DEFAULT_BASELINE_FILE.into() }
    }
}

impl Target {
    pub fn to_spec(&self) -> Result<CheckSpec, ConfigError> {
        let port = match self.mode {
            CheckMode::Tcp => Some(self.port.unwrap_or(DEFAULT_TCP_PORT)),
            CheckMode::Http | CheckMode::Ping => self.port,
        };

        CheckSpec::new(self.mode, &self.host, port).map_err(|source| ConfigError::InvalidTarget {
            host: self.host.clone(),
            mode: self.mode,
            source,
        })
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/hostwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Some(config_home) = env::var_os("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::var_os("HOME") {
        path::PathBuf::from(home_dir).join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("hostwatch/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Monitor")?;
        write_1(f, "Interval (s)", &self.monitor.interval_seconds)?;
        write_1(f, "Max Nodes", &self.monitor.max_nodes)?;
        write_1(f, "Update Policy", &format!("{:?}", self.monitor.update_policy))?;
        write_title_1(f, "Provider")?;
        write_1(f, "Base URL", &self.provider.base_url)?;
        write_1(f, "Request Timeout (s)", &self.provider.request_timeout_seconds)?;
        write_1(f, "Poll Attempts", &self.provider.poll_attempts)?;
        write_1(f, "Poll Interval (s)", &self.provider.poll_interval_seconds)?;
        write_title_1(f, "Baseline")?;
        write_1(f, "Path", &self.baseline.path.display())?;
        write_title_1(f, "Thresholds")?;
        write_1(f, "Min Samples", &self.thresholds.min_samples)?;
        write_1(f, "Sigma", &self.thresholds.sigma)?;
        write_1(f, "Factor", &self.thresholds.factor)?;
        write_1(f, "Loss Baseline Max", &self.thresholds.loss_baseline_max)?;
        write_1(f, "Loss Absolute", &self.thresholds.loss_absolute)?;
        write_title_1(f, "Targets")?;
        for target in &self.targets {
            match target.port {
                Some(port) => {
                    write_1(f, target.mode.as_str(), &format!("{}:{}", target.host, port))?
                }
                None => write_1(f, target.mode.as_str(), &target.host)?,
            }
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/hostwatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            let config: Self = toml::from_str(raw_string.as_str())?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let interval = self.provider.poll_interval_seconds;
        if !interval.is_finite() || interval < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "provider.poll_interval_seconds",
                reason: format!("{interval} is not a non-negative number of seconds"),
            });
        }
        if let Err(e) = Duration::try_from_secs_f64(interval) {
            return Err(ConfigError::InvalidValue {
                field: "provider.poll_interval_seconds",
                reason: e.to_string(),
            });
        }

        self.target_specs()?;
        Ok(())
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let mut config_str: String = toml::to_string_pretty(self)?;
        if self.targets.is_empty() {
            config_str.push_str(TARGETS_EXAMPLE);
        }
        let write_err = |source| ConfigError::WriteFailed { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        std::fs::write(path, config_str).map_err(write_err)
    }

    /// Validated check specs for every configured target
    pub fn target_specs(&self) -> Result<Vec<CheckSpec>, ConfigError> {
        self.targets.iter().map(Target::to_spec).collect()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_seconds.max(1))
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            max_nodes: self.monitor.max_nodes,
            poll: PollOptions::new(
                self.provider.poll_attempts,
                self.provider.poll_interval_seconds,
            ),
            thresholds: self.thresholds.clone(),
            update_policy: self.monitor.update_policy,
            baseline_path: Some(self.baseline.path.clone()),
            read_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hostwatch").join("config");

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.monitor.interval_seconds, 600);
        assert_eq!(config.provider.poll_attempts, 10);
        let written = fs::read_to_string(path.with_extension("toml")).unwrap();
        assert!(written.contains("# [[targets]]"));
        // The example stays commented out
        assert!(Config::from_config(Some(&path)).unwrap().targets.is_empty());
    }

    #[test]
    fn unusable_poll_interval_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        for value in ["inf", "nan", "-1.0", "1e300"] {
            fs::write(&path, format!("[provider]\npoll_interval_seconds = {value}\n")).unwrap();
            assert!(
                matches!(Config::from_config(Some(&path)), Err(ConfigError::InvalidValue { .. })),
                "{value} accepted"
            );
        }
    }

    #[test]
    fn partial_file_is_filled_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[monitor]
interval_seconds = 300
update_policy = "skip_anomalies"

[thresholds]
min_samples = 10

[[targets]]
host = "https://example.com"
mode = "http"

[[targets]]
host = "example.com"
mode = "tcp"
"#,
        )
        .unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.monitor.interval_seconds, 300);
        assert_eq!(config.monitor.max_nodes, 50);
        assert_eq!(config.monitor.update_policy, UpdatePolicy::SkipAnomalies);
        assert_eq!(config.thresholds.min_samples, 10);
        assert_eq!(config.thresholds.sigma, 3.0);

        let specs = config.target_specs().unwrap();
        assert_eq!(specs[0].target(), "https://example.com");
        // tcp falls back to 443
        assert_eq!(specs[1].target(), "example.com:443");
    }

    #[test]
    fn invalid_target_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[[targets]]\nhost = \"example.com\"\nmode = \"ping\"\nport = 22\n")
            .unwrap();

        assert!(matches!(Config::from_config(Some(&path)), Err(ConfigError::InvalidTarget { .. })));
    }

    #[test]
    fn written_config_reads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.targets.push(Target {
            host: "example.com".into(),
            mode: CheckMode::Ping,
            port: None,
        });
        config.write_config(&path).unwrap();

        let read = Config::from_config(Some(&path)).unwrap();
        assert_eq!(read.targets.len(), 1);
        assert_eq!(read.baseline.path, path::PathBuf::from(DEFAULT_BASELINE_FILE));
    }
}
