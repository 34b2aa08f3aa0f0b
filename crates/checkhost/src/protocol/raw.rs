//! Per-node raw results.
//!
//! The provider answers each node with a payload whose shape depends on the
//! check mode. Decoding is driven by the mode of the request, never by
//! guessing from the payload, and a payload that does not fit becomes
//! `NodeRawResult::Malformed` instead of failing the whole batch.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{CheckMode, value_to_string};

/// One ping reply: `[status, rtt, ip?]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingReply {
    pub status: String,
    pub rtt: Option<f64>,
    pub ip: Option<String>,
}

impl PingReply {
    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }
}

/// HTTP result: `[success, time, status_text, http_code, ip]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRaw {
    pub success: bool,
    pub time: Option<f64>,
    pub status_text: Option<String>,
    pub status_code: Option<String>,
    pub ip: Option<String>,
}

/// TCP result: `{"time": .., "address": ..}` or `{"error": ..}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpRaw {
    pub time: Option<f64>,
    pub address: Option<String>,
    pub error: Option<String>,
}

/// Raw result reported by one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeRawResult {
    Ping { replies: Vec<PingReply> },
    Http(HttpRaw),
    Tcp(TcpRaw),
    Malformed { reason: String },
}

impl NodeRawResult {
    /// Whether a node's payload in a poll response means "still running"
    pub fn is_pending(value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Decode a non-pending payload for the given mode
    pub fn decode(mode: CheckMode, value: &Value) -> Self {
        let decoded = match mode {
            CheckMode::Ping => decode_ping(value).map(|replies| NodeRawResult::Ping { replies }),
            CheckMode::Http => decode_http(value).map(NodeRawResult::Http),
            CheckMode::Tcp => decode_tcp(value).map(NodeRawResult::Tcp),
        };

        decoded.unwrap_or_else(|reason| NodeRawResult::Malformed { reason })
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        NodeRawResult::Malformed { reason: reason.into() }
    }
}

fn first_entry(value: &Value) -> Result<&Value, String> {
    value
        .as_array()
        .ok_or_else(|| format!("expected an array, got {value}"))?
        .first()
        .ok_or_else(|| "empty result".to_string())
}

fn decode_ping(value: &Value) -> Result<Vec<PingReply>, String> {
    // `[null]` / `[[null]]`: the node could not resolve the target
    let attempts = match first_entry(value)? {
        Value::Null => return Ok(Vec::new()),
        Value::Array(attempts) => attempts,
        other => return Err(format!("expected ping attempts, got {other}")),
    };

    let mut replies = Vec::with_capacity(attempts.len());
    for attempt in attempts {
        let fields = match attempt {
            Value::Null => continue,
            Value::Array(fields) => fields,
            other => return Err(format!("expected ping reply, got {other}")),
        };

        let status = fields
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| "ping reply without status".to_string())?;

        replies.push(PingReply {
            status: status.to_string(),
            rtt: fields.get(1).and_then(Value::as_f64),
            ip: fields.get(2).and_then(value_to_string),
        });
    }

    Ok(replies)
}

fn decode_http(value: &Value) -> Result<HttpRaw, String> {
    let fields = first_entry(value)?
        .as_array()
        .ok_or_else(|| "expected http result fields".to_string())?;

    let success = match fields.first() {
        Some(Value::Number(flag)) => flag.as_i64() == Some(1),
        Some(Value::Bool(flag)) => *flag,
        _ => return Err("http result without success flag".to_string()),
    };

    Ok(HttpRaw {
        success,
        time: fields.get(1).and_then(Value::as_f64),
        status_text: fields.get(2).and_then(value_to_string),
        status_code: fields.get(3).and_then(value_to_string),
        ip: fields.get(4).and_then(value_to_string),
    })
}

fn decode_tcp(value: &Value) -> Result<TcpRaw, String> {
    let entry = first_entry(value)?
        .as_object()
        .ok_or_else(|| "expected tcp result object".to_string())?;

    let raw = TcpRaw {
        time: entry.get("time").and_then(Value::as_f64),
        address: entry.get("address").and_then(value_to_string),
        error: entry.get("error").and_then(value_to_string),
    };

    if raw.time.is_none() && raw.error.is_none() {
        return Err("tcp result has neither time nor error".to_string());
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pending_payloads() {
        assert!(NodeRawResult::is_pending(&Value::Null));
        assert!(NodeRawResult::is_pending(&json!([])));
        assert!(!NodeRawResult::is_pending(&json!([null])));
    }

    #[test]
    fn ping_replies() {
        let raw = NodeRawResult::decode(
            CheckMode::Ping,
            &json!([[["OK", 0.044, "93.184.216.34"], ["TIMEOUT", 3.005], ["OK", 0.046]]]),
        );
        let NodeRawResult::Ping { replies } = raw else {
            panic!("expected ping result, got {raw:?}");
        };
        assert_eq!(replies.len(), 3);
        assert!(replies[0].is_ok());
        assert_eq!(replies[0].ip.as_deref(), Some("93.184.216.34"));
        assert!(!replies[1].is_ok());
        assert_eq!(replies[2].ip, None);
    }

    #[test]
    fn ping_unresolved_has_no_replies() {
        assert_eq!(
            NodeRawResult::decode(CheckMode::Ping, &json!([[null]])),
            NodeRawResult::Ping { replies: vec![] }
        );
        assert_eq!(
            NodeRawResult::decode(CheckMode::Ping, &json!([null])),
            NodeRawResult::Ping { replies: vec![] }
        );
    }

    #[test]
    fn http_result() {
        let raw = NodeRawResult::decode(
            CheckMode::Http,
            &json!([[1, 0.136, "OK", "200", "93.184.216.34"]]),
        );
        assert_eq!(
            raw,
            NodeRawResult::Http(HttpRaw {
                success: true,
                time: Some(0.136),
                status_text: Some("OK".into()),
                status_code: Some("200".into()),
                ip: Some("93.184.216.34".into()),
            })
        );
    }

    #[test]
    fn tcp_error_result() {
        let raw =
            NodeRawResult::decode(CheckMode::Tcp, &json!([{"error": "Connection timed out"}]));
        assert_eq!(
            raw,
            NodeRawResult::Tcp(TcpRaw {
                time: None,
                address: None,
                error: Some("Connection timed out".into()),
            })
        );
    }

    #[test]
    fn shape_mismatch_is_malformed() {
        // http payload decoded as tcp
        let raw = NodeRawResult::decode(CheckMode::Tcp, &json!([[1, 0.1, "OK", "200", "1.1.1.1"]]));
        assert!(matches!(raw, NodeRawResult::Malformed { .. }));

        let raw = NodeRawResult::decode(CheckMode::Http, &json!({"unexpected": true}));
        assert!(matches!(raw, NodeRawResult::Malformed { .. }));

        let raw = NodeRawResult::decode(CheckMode::Ping, &json!([[[42, 0.1]]]));
        assert!(matches!(raw, NodeRawResult::Malformed { .. }));
    }
}
