//! Wire types for the check-host.net API.
//!
//! `types` holds what the caller builds and what submission returns;
//! `raw` holds the per-node result payloads, decoded per check mode.

pub mod raw;
pub mod types;

pub use raw::{HttpRaw, NodeRawResult, PingReply, TcpRaw};
pub use types::{CheckMode, CheckRequest, CheckSpec, NodeInfo};
