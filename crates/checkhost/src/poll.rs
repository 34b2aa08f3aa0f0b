//! Bounded polling for check results.
//!
//! The provider answers each dispatched node asynchronously. `poll` asks
//! for results at most `max_attempts` times and stops early once every
//! dispatched node has answered. Nodes that never answer are simply absent
//! from the outcome.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::CheckProvider;
use crate::error::ProviderError;
use crate::protocol::{CheckRequest, NodeRawResult};

/// Poll loop parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollOptions {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollOptions {
    /// Negative or NaN intervals become zero; values too large for a
    /// `Duration` saturate
    pub fn new(max_attempts: u32, interval_seconds: f64) -> Self {
        let interval =
            Duration::try_from_secs_f64(interval_seconds.max(0.0)).unwrap_or(Duration::MAX);
        Self { max_attempts: max_attempts.max(1), interval }
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::new(10, 2.0)
    }
}

/// Results collected by the poll loop
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub results: BTreeMap<String, NodeRawResult>,
    /// Every dispatched node answered
    pub complete: bool,
}

/// Poll `provider` until all nodes of `request` answered or attempts run out
///
/// Returns `ProviderError::Timeout` only when no node answered at all;
/// partial answers come back with `complete == false`.
pub async fn poll(
    provider: &dyn CheckProvider,
    request: &CheckRequest,
    options: PollOptions,
    cancel: &CancellationToken,
) -> Result<PollOutcome, ProviderError> {
    let mut results: BTreeMap<String, NodeRawResult> = BTreeMap::new();
    let mut last_error: Option<ProviderError> = None;

    for attempt in 1..=options.max_attempts {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        match provider.fetch_results(&request.request_id).await {
            Ok(payload) => {
                let mut pending = 0usize;
                for (node, value) in payload {
                    // Only nodes listed on submission count, unless none were listed
                    if !request.nodes.is_empty() && !request.nodes.contains_key(&node) {
                        continue;
                    }
                    if NodeRawResult::is_pending(&value) {
                        pending += 1;
                        continue;
                    }
                    results
                        .entry(node)
                        .or_insert_with(|| NodeRawResult::decode(request.mode, &value));
                }

                let complete = if request.nodes.is_empty() {
                    pending == 0 && !results.is_empty()
                } else {
                    results.len() >= request.nodes.len()
                };

                debug!(
                    request_id = %request.request_id,
                    attempt,
                    answered = results.len(),
                    dispatched = request.nodes.len(),
                    "Polled check results"
                );

                if complete {
                    return Ok(PollOutcome { results, complete: true });
                }
            }
            Err(e) => {
                warn!(
                    request_id = %request.request_id,
                    attempt,
                    "Fetching check results failed: {}",
                    e
                );
                last_error = Some(e);
            }
        }

        if attempt < options.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                _ = tokio::time::sleep(options.interval) => {}
            }
        }
    }

    if results.is_empty() {
        return Err(last_error.unwrap_or(ProviderError::Timeout { attempts: options.max_attempts }));
    }

    warn!(
        request_id = %request.request_id,
        answered = results.len(),
        dispatched = request.nodes.len(),
        "Poll attempts exhausted, continuing with partial results"
    );
    Ok(PollOutcome { results, complete: false })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_clamp_out_of_range_values() {
        assert_eq!(PollOptions::new(0, 1.5).max_attempts, 1);
        assert_eq!(PollOptions::new(3, 1.5).interval, Duration::from_millis(1500));
        assert_eq!(PollOptions::new(3, -2.0).interval, Duration::ZERO);
        assert_eq!(PollOptions::new(3, f64::NAN).interval, Duration::ZERO);
        assert_eq!(PollOptions::new(3, f64::INFINITY).interval, Duration::MAX);
        assert_eq!(PollOptions::new(3, 1e300).interval, Duration::MAX);
    }
}
