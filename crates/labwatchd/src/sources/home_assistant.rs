//! Home Assistant UPS load sensor.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{endpoint, fetch_json, non_empty, MetricSource, SourceError, SourceUpdate};
use crate::config::HomeAssistantConfig;

#[derive(Debug, Deserialize)]
struct EntityState {
    state: String,
}

pub struct HomeAssistantSource {
    client: Client,
    url: String,
    token: String,
}

impl HomeAssistantSource {
    pub fn new(client: Client, base_url: &str, token: &str, ups_sensor: &str) -> Self {
        Self {
            client,
            url: endpoint(base_url, &format!("api/states/{}", ups_sensor)),
            token: token.to_string(),
        }
    }

    /// Polling needs a UPS sensor; toggles only need url and token
    /// and are handled by the action dispatcher.
    pub fn from_config(config: &HomeAssistantConfig, client: &Client) -> Option<Self> {
        let url = non_empty(&config.url)?;
        let token = non_empty(&config.token)?;
        let sensor = non_empty(&config.ups_sensor)?;
        Some(Self::new(client.clone(), url, token, sensor))
    }
}

#[async_trait]
impl MetricSource for HomeAssistantSource {
    fn name(&self) -> &'static str {
        "home_assistant"
    }

    async fn poll(&self) -> Result<SourceUpdate, SourceError> {
        let request = self.client.get(&self.url).bearer_auth(&self.token);
        let entity: EntityState = fetch_json(request).await?;

        // "unavailable" / "unknown" while the UPS integration reconnects
        let watts: f64 = entity
            .state
            .trim()
            .parse()
            .map_err(|_| SourceError::Malformed(format!("sensor state '{}'", entity.state)))?;

        Ok(SourceUpdate {
            ups_watts: Some(watts.max(0.0)),
            ..Default::default()
        })
    }
}
