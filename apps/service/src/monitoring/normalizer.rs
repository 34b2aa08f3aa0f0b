//! Provider payloads to measurement records.
//!
//! Every node yields exactly one record. A payload that cannot be read
//! becomes an unsuccessful record with a diagnostic, so one bad node never
//! holds up the others.

use checkhost::protocol::{HttpRaw, PingReply, TcpRaw};
use checkhost::{CheckMode, CheckSpec, NodeInfo, NodeRawResult};
use tracing::debug;

use super::metrics;
use super::types::{MeasurementRecord, ReplyCount};

/// Build the record for one node
pub fn normalize(
    spec: &CheckSpec,
    node_id: &str,
    node: Option<&NodeInfo>,
    raw: &NodeRawResult,
) -> MeasurementRecord {
    let location = node.map(NodeInfo::location).unwrap_or_else(|| NodeInfo::unknown().location());
    let record = MeasurementRecord::new(spec, node_id, location);

    match (spec.mode(), raw) {
        (CheckMode::Http, NodeRawResult::Http(http)) => normalize_http(record, http),
        (CheckMode::Tcp, NodeRawResult::Tcp(tcp)) => normalize_tcp(record, tcp),
        (CheckMode::Ping, NodeRawResult::Ping { replies }) => normalize_ping(record, replies),
        (_, NodeRawResult::Malformed { reason }) => {
            debug!(node = node_id, reason = %reason, "Malformed node result");
            record.failure(format!("malformed result: {reason}"))
        }
        (mode, other) => {
            record.failure(format!("{mode} check returned a {} result", kind_of(other)))
        }
    }
}

fn kind_of(raw: &NodeRawResult) -> &'static str {
    match raw {
        NodeRawResult::Ping { .. } => "ping",
        NodeRawResult::Http(_) => "http",
        NodeRawResult::Tcp(_) => "tcp",
        NodeRawResult::Malformed { .. } => "malformed",
    }
}

fn normalize_http(mut record: MeasurementRecord, raw: &HttpRaw) -> MeasurementRecord {
    record.resolved_ip = raw.ip.clone();
    record.status_text = raw.status_text.clone();
    record.status_code = raw.status_code.clone();

    if !raw.success {
        let message = raw.status_text.clone().unwrap_or_else(|| "HTTP check failed".to_string());
        return record.failure(message);
    }

    match raw.time {
        Some(time) => {
            record.success = true;
            record.metrics.insert(metrics::TIME.to_string(), time);
            record
        }
        None => record.failure("HTTP result without response time"),
    }
}

fn normalize_tcp(mut record: MeasurementRecord, raw: &TcpRaw) -> MeasurementRecord {
    match raw.time {
        Some(time) => {
            record.success = true;
            record.resolved_ip = raw.address.clone();
            record.metrics.insert(metrics::TIME.to_string(), time);
            record
        }
        None => record.failure(raw.error.clone().unwrap_or_else(|| "Error".to_string())),
    }
}

fn normalize_ping(mut record: MeasurementRecord, replies: &[PingReply]) -> MeasurementRecord {
    let total = replies.len();
    let ok = replies.iter().filter(|reply| reply.is_ok()).count();
    record.replies = Some(ReplyCount { ok, total });
    record.resolved_ip = replies.iter().find_map(|reply| reply.ip.clone());

    if total == 0 {
        return record.failure("no replies");
    }

    let rtts: Vec<f64> = replies
        .iter()
        .filter(|reply| reply.is_ok())
        .filter_map(|reply| reply.rtt)
        .collect();

    if !rtts.is_empty() {
        let avg = rtts.iter().sum::<f64>() / rtts.len() as f64;
        let min = rtts.iter().copied().fold(f64::INFINITY, f64::min);
        let max = rtts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        record.metrics.insert(metrics::RTT_AVG.to_string(), avg);
        record.metrics.insert(metrics::RTT_MIN.to_string(), min);
        record.metrics.insert(metrics::RTT_MAX.to_string(), max);
    }

    let loss = (total - ok) as f64 / total as f64;
    record.metrics.insert(metrics::LOSS.to_string(), loss);
    record.success = ok == total;
    if !record.success {
        record.error_message = Some(format!("{ok}/{total} replies OK"));
    }
    record
}
