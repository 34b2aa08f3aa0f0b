use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::SpecError;

/// Kind of check the provider runs from each node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckMode {
    Http,
    Ping,
    Tcp,
}

impl CheckMode {
    pub const ALL: [CheckMode; 3] = [CheckMode::Http, CheckMode::Ping, CheckMode::Tcp];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckMode::Http => "http",
            CheckMode::Ping => "ping",
            CheckMode::Tcp => "tcp",
        }
    }

    /// Submission endpoint path for this mode
    pub fn endpoint(&self) -> &'static str {
        match self {
            CheckMode::Http => "check-http",
            CheckMode::Ping => "check-ping",
            CheckMode::Tcp => "check-tcp",
        }
    }
}

impl fmt::Display for CheckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckMode {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(CheckMode::Http),
            "ping" => Ok(CheckMode::Ping),
            "tcp" => Ok(CheckMode::Tcp),
            other => Err(SpecError::UnknownMode(other.to_string())),
        }
    }
}

/// A single check invocation: what to probe and how
///
/// The target is normalised on construction so that the same endpoint
/// always yields the same string:
/// - http keeps the trimmed URL
/// - ping keeps only the host name
/// - tcp keeps the host name and appends `:port`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CheckSpec {
    mode: CheckMode,
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
}

impl CheckSpec {
    pub fn new(mode: CheckMode, target: &str, port: Option<u16>) -> Result<Self, SpecError> {
        let trimmed = target.trim();
        if trimmed.is_empty() {
            return Err(SpecError::EmptyTarget);
        }

        let target = match (mode, port) {
            (CheckMode::Tcp, None) => return Err(SpecError::MissingPort),
            (CheckMode::Http | CheckMode::Ping, Some(_)) => return Err(SpecError::UnexpectedPort),
            (CheckMode::Http, None) => validate_http_target(trimmed)?,
            (CheckMode::Ping, None) => bare_host(trimmed)?,
            (CheckMode::Tcp, Some(port)) => format!("{}:{}", bare_host(trimmed)?, port),
        };

        Ok(Self { mode, target, port })
    }

    pub fn http(target: &str) -> Result<Self, SpecError> {
        Self::new(CheckMode::Http, target, None)
    }

    pub fn ping(target: &str) -> Result<Self, SpecError> {
        Self::new(CheckMode::Ping, target, None)
    }

    pub fn tcp(host: &str, port: u16) -> Result<Self, SpecError> {
        Self::new(CheckMode::Tcp, host, Some(port))
    }

    pub fn mode(&self) -> CheckMode {
        self.mode
    }

    /// Normalised target; sent to the provider as `host`
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl fmt::Display for CheckSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.mode, self.target)
    }
}

fn validate_http_target(target: &str) -> Result<String, SpecError> {
    // Bare host names are accepted by the provider as-is
    if !target.contains("://") {
        return Ok(target.to_string());
    }

    let url = Url::parse(target).map_err(|e| SpecError::InvalidUrl {
        target: target.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(target.to_string()),
        other => Err(SpecError::InvalidUrl {
            target: target.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

/// Strip scheme and path, keep only the host part
fn bare_host(target: &str) -> Result<String, SpecError> {
    let without_scheme = match target.split_once("://") {
        Some((_, rest)) => rest,
        None => target,
    };
    let host = without_scheme.split('/').next().unwrap_or_default().trim();

    if host.is_empty() {
        return Err(SpecError::EmptyTarget);
    }
    Ok(host.to_string())
}

/// Metadata for one probing node, as listed by the provider on submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub country_code: String,
    pub country: String,
    pub city: String,
    pub ip: String,
    pub asn: String,
}

impl NodeInfo {
    /// Decode the provider's positional `[code, country, city, ip, asn, ...]` array
    pub fn from_fields(fields: &[Value]) -> Self {
        let field = |idx: usize| {
            fields
                .get(idx)
                .and_then(value_to_string)
                .unwrap_or_else(|| "-".to_string())
        };

        Self {
            country_code: field(0),
            country: field(1),
            city: field(2),
            ip: field(3),
            asn: field(4),
        }
    }

    pub fn unknown() -> Self {
        Self::from_fields(&[])
    }

    /// "Country, City"; used as the location part of baseline keys
    pub fn location(&self) -> String {
        format!("{}, {}", self.country, self.city)
    }
}

/// Handle for a submitted check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub request_id: String,
    pub mode: CheckMode,
    /// Nodes the provider dispatched the check to, keyed by node host name
    pub nodes: BTreeMap<String, NodeInfo>,
    pub permanent_link: Option<String>,
}

/// Submission response body
#[derive(Debug, Deserialize)]
pub(crate) struct SubmitResponse {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub permanent_link: Option<String>,
    #[serde(default)]
    pub nodes: BTreeMap<String, Vec<Value>>,
    #[serde(default)]
    pub error: Option<Value>,
}

pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
