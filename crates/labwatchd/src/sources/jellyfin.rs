//! Jellyfin active transcodes.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{endpoint, fetch_json, non_empty, MetricSource, SourceError, SourceUpdate};
use crate::config::JellyfinConfig;

#[derive(Debug, Deserialize)]
struct Session {
    #[serde(rename = "TranscodingInfo", default)]
    transcoding_info: Option<Value>,
}

pub struct JellyfinSource {
    client: Client,
    url: String,
    api_key: String,
}

impl JellyfinSource {
    pub fn new(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            url: endpoint(base_url, "Sessions"),
            api_key: api_key.to_string(),
        }
    }

    pub fn from_config(config: &JellyfinConfig, client: &Client) -> Option<Self> {
        let url = non_empty(&config.url)?;
        let key = non_empty(&config.api_key)?;
        Some(Self::new(client.clone(), url, key))
    }
}

#[async_trait]
impl MetricSource for JellyfinSource {
    fn name(&self) -> &'static str {
        "jellyfin"
    }

    async fn poll(&self) -> Result<SourceUpdate, SourceError> {
        let request = self.client.get(&self.url).header("X-Emby-Token", &self.api_key);
        let sessions: Vec<Session> = fetch_json(request).await?;

        let transcodes = sessions
            .iter()
            .filter(|s| matches!(s.transcoding_info, Some(ref v) if !v.is_null()))
            .count();

        Ok(SourceUpdate {
            active_transcodes: Some(u32::try_from(transcodes).unwrap_or(u32::MAX)),
            ..Default::default()
        })
    }
}
