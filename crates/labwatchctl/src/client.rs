//! HTTP client for communicating with labwatchd.

use anyhow::{anyhow, Context, Result};
use labwatch_common::{
    ActionRequest, ApiEnvelope, ControlRequest, ErrorBody, HealthResponse, HostTelemetry,
    IngestAck, MessageAck, MetricsSnapshot, SuccessAck,
};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Default daemon address
pub fn default_url() -> String {
    format!("http://127.0.0.1:{}", labwatch_common::DEFAULT_PORT)
}

/// Client for communicating with labwatchd
pub struct LabwatchClient {
    http: reqwest::Client,
    base_url: String,
}

impl LabwatchClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(|e| {
            anyhow!(
                "Cannot reach labwatchd at {}: {}\n\n\
                 Is the daemon running? Check with:\n\
                 systemctl status labwatchd",
                self.base_url,
                e
            )
        })?;
        decode(response).await
    }

    /// Current snapshot, refreshed by the daemon if it is stale
    pub async fn snapshot(&self) -> Result<MetricsSnapshot> {
        let envelope: ApiEnvelope<MetricsSnapshot> =
            self.send(self.http.get(self.url("/api/god-tier-metrics"))).await?;
        Ok(envelope.data)
    }

    /// Snapshot as the daemon sent it, for `--json`
    pub async fn snapshot_raw(&self) -> Result<Value> {
        self.send(self.http.get(self.url("/api/god-tier-metrics"))).await
    }

    pub async fn host(&self) -> Result<HostTelemetry> {
        self.send(self.http.get(self.url("/api/metrics"))).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.send(self.http.get(self.url("/health"))).await
    }

    pub async fn chaos(&self) -> Result<MessageAck> {
        let body = ControlRequest {
            action: "trigger_chaos".to_string(),
            entity_id: None,
        };
        self.send(self.http.post(self.url("/api/god-tier-metrics")).json(&body))
            .await
    }

    pub async fn toggle(&self, entity_id: &str) -> Result<MessageAck> {
        let body = ControlRequest {
            action: "ha_toggle".to_string(),
            entity_id: Some(entity_id.to_string()),
        };
        self.send(self.http.post(self.url("/api/god-tier-metrics")).json(&body))
            .await
    }

    pub async fn exec(&self, action: &str) -> Result<SuccessAck> {
        let body = ActionRequest {
            action: action.to_string(),
        };
        self.send(self.http.post(self.url("/api/docker-control")).json(&body))
            .await
    }

    /// Push host telemetry the way the homelab agent does
    pub async fn push(&self, telemetry: &Value, key: &str) -> Result<IngestAck> {
        self.send(
            self.http
                .post(self.url("/api/metrics"))
                .header("x-api-key", key)
                .json(telemetry),
        )
        .await
    }
}

/// Decode a success body, or turn the daemon's `{"error": ...}` into an error
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let bytes = response.bytes().await.context("Failed to read response")?;

    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorBody>(&bytes)
            .map(|e| e.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
        return Err(anyhow!("labwatchd returned {}: {}", status, message));
    }

    serde_json::from_slice(&bytes).context("Unexpected response from labwatchd")
}
