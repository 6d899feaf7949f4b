//! Proxmox VE node status.

use async_trait::async_trait;
use labwatch_common::clamp_percent;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{endpoint, fetch_json, non_empty, MetricSource, SourceError, SourceUpdate};
use crate::config::ProxmoxConfig;

#[derive(Debug, Deserialize)]
struct NodeStatusResponse {
    data: NodeStatus,
}

#[derive(Debug, Deserialize)]
struct NodeStatus {
    /// Fraction of all cores, 0.0..=1.0
    cpu: f64,
    memory: MemoryStatus,
}

#[derive(Debug, Deserialize)]
struct MemoryStatus {
    used: f64,
    total: f64,
}

pub struct ProxmoxSource {
    client: Client,
    url: String,
    auth_header: String,
}

impl ProxmoxSource {
    pub fn new(client: Client, base_url: &str, node: &str, token_id: &str, token_secret: &str) -> Self {
        Self {
            client,
            url: endpoint(base_url, &format!("api2/json/nodes/{}/status", node)),
            auth_header: format!("PVEAPIToken={}={}", token_id, token_secret),
        }
    }

    /// Needs url, node and a full API token. Gets its own client when
    /// certificate checks are disabled so the shared one stays strict.
    pub fn from_config(
        config: &ProxmoxConfig,
        client: &Client,
        timeout: Duration,
    ) -> reqwest::Result<Option<Self>> {
        let (Some(url), Some(node), Some(token_id), Some(secret)) = (
            non_empty(&config.url),
            non_empty(&config.node),
            non_empty(&config.token_id),
            non_empty(&config.token_secret),
        ) else {
            return Ok(None);
        };

        let client = if config.accept_invalid_certs {
            Client::builder()
                .timeout(timeout)
                .danger_accept_invalid_certs(true)
                .build()?
        } else {
            client.clone()
        };

        Ok(Some(Self::new(client, url, node, token_id, secret)))
    }
}

#[async_trait]
impl MetricSource for ProxmoxSource {
    fn name(&self) -> &'static str {
        "proxmox"
    }

    async fn poll(&self) -> Result<SourceUpdate, SourceError> {
        let request = self
            .client
            .get(&self.url)
            .header("Authorization", &self.auth_header);
        let status: NodeStatusResponse = fetch_json(request).await?;

        if status.data.memory.total <= 0.0 {
            return Err(SourceError::Malformed("memory.total is zero".to_string()));
        }

        Ok(SourceUpdate {
            pve_cpu: Some(clamp_percent(status.data.cpu * 100.0)),
            pve_ram: Some(clamp_percent(
                status.data.memory.used / status.data.memory.total * 100.0,
            )),
            ..Default::default()
        })
    }
}
