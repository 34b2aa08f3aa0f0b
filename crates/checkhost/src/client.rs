use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::protocol::types::SubmitResponse;
use crate::protocol::{CheckMode, CheckRequest, CheckSpec, NodeInfo};

/// Poll response: node host name to its payload (`null` while pending)
pub type ResultPayload = BTreeMap<String, Value>;

/// Remote probing provider
///
/// One call per method, no retries. The poll loop in [`crate::poll`] is
/// built on top of `fetch_results`.
#[async_trait::async_trait]
pub trait CheckProvider: Send + Sync {
    /// Submit a check and return the handle for polling
    async fn submit(&self, spec: &CheckSpec, max_nodes: u32) -> Result<CheckRequest, ProviderError>;

    /// Fetch the current per-node results of a submitted check
    async fn fetch_results(&self, request_id: &str) -> Result<ResultPayload, ProviderError>;
}

/// check-host.net HTTP API client
pub struct CheckHostClient {
    client: reqwest::Client,
    base_url: String,
}

impl CheckHostClient {
    pub fn new(base_url: &str, timeout_seconds: u64) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("hostwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, ProviderError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .query(query)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<Value>().await?)
    }
}

#[async_trait::async_trait]
impl CheckProvider for CheckHostClient {
    async fn submit(
        &self,
        spec: &CheckSpec,
        max_nodes: u32,
    ) -> Result<CheckRequest, ProviderError> {
        let url = format!("{}/{}", self.base_url, spec.mode().endpoint());
        let max_nodes = max_nodes.to_string();

        debug!(mode = %spec.mode(), target = spec.target(), "Submitting check");
        let query = [("host", spec.target()), ("max_nodes", max_nodes.as_str())];
        let body = self.get_json(&url, &query).await?;

        let request = parse_submit_response(spec.mode(), body)?;
        info!(
            mode = %spec.mode(),
            target = spec.target(),
            request_id = %request.request_id,
            nodes = request.nodes.len(),
            "Check submitted"
        );
        Ok(request)
    }

    async fn fetch_results(&self, request_id: &str) -> Result<ResultPayload, ProviderError> {
        let url = format!("{}/check-result/{}", self.base_url, request_id);
        let body = self.get_json(&url, &[]).await?;
        parse_result_payload(body)
    }
}

/// Turn a submission body into a request handle
pub fn parse_submit_response(mode: CheckMode, body: Value) -> Result<CheckRequest, ProviderError> {
    let response: SubmitResponse =
        serde_json::from_value(body).map_err(|e| ProviderError::Decode(e.to_string()))?;

    let Some(request_id) = response.request_id.filter(|id| !id.is_empty()) else {
        let reason = response
            .error
            .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
            .unwrap_or_else(|| "no request id (rate limit or provider error)".to_string());
        return Err(ProviderError::Rejected(reason));
    };

    let nodes = response
        .nodes
        .into_iter()
        .map(|(node, fields)| (node, NodeInfo::from_fields(&fields)))
        .collect();

    Ok(CheckRequest { request_id, mode, nodes, permanent_link: response.permanent_link })
}

/// Turn a poll body into a node -> payload map
pub fn parse_result_payload(body: Value) -> Result<ResultPayload, ProviderError> {
    match body {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(ProviderError::Decode(format!("expected an object, got {other}"))),
    }
}
