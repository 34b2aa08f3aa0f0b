//! checkhost - client for the check-host.net multi-node probing service
//!
//! This library submits HTTP, ping and TCP checks to the provider, polls
//! for per-node results and decodes the mode-specific payloads into typed
//! values.

pub mod client;
pub mod error;
pub mod poll;
pub mod protocol;

// Re-export main types
pub use client::{CheckHostClient, CheckProvider, ResultPayload};
pub use error::{ProviderError, SpecError};
pub use poll::{PollOptions, PollOutcome, poll};
pub use protocol::{CheckMode, CheckRequest, CheckSpec, NodeInfo, NodeRawResult};

/// Public endpoint of the provider
pub const DEFAULT_BASE_URL: &str = "https://check-host.net";

/// Default number of nodes requested per check
pub const DEFAULT_MAX_NODES: u32 = 50;
