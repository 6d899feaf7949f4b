//! Pi-hole block percentage.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{endpoint, fetch_json, non_empty, MetricSource, SourceError, SourceUpdate};
use crate::config::PiholeConfig;

pub struct PiholeSource {
    client: Client,
    url: String,
    api_token: String,
}

impl PiholeSource {
    pub fn new(client: Client, base_url: &str, api_token: &str) -> Self {
        Self {
            client,
            url: endpoint(base_url, "admin/api.php"),
            api_token: api_token.to_string(),
        }
    }

    pub fn from_config(config: &PiholeConfig, client: &Client) -> Option<Self> {
        let url = non_empty(&config.url)?;
        let token = non_empty(&config.api_token)?;
        Some(Self::new(client.clone(), url, token))
    }
}

/// Older Pi-hole releases quote numbers in summaryRaw
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl MetricSource for PiholeSource {
    fn name(&self) -> &'static str {
        "pihole"
    }

    async fn poll(&self) -> Result<SourceUpdate, SourceError> {
        let request = self
            .client
            .get(&self.url)
            .query(&[("summaryRaw", ""), ("auth", self.api_token.as_str())]);
        let body: Value = fetch_json(request).await?;

        let pct = body
            .get("ads_percentage_today")
            .and_then(number)
            .ok_or_else(|| SourceError::Malformed("ads_percentage_today missing".to_string()))?;

        Ok(SourceUpdate {
            dns_blocked: Some(pct),
            ..Default::default()
        })
    }
}
