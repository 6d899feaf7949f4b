//! Ollama loaded-model VRAM.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{endpoint, fetch_json, non_empty, MetricSource, SourceError, SourceUpdate};
use crate::config::OllamaConfig;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Deserialize)]
struct PsResponse {
    #[serde(default)]
    models: Vec<RunningModel>,
}

#[derive(Debug, Deserialize)]
struct RunningModel {
    #[serde(default)]
    size_vram: u64,
}

pub struct OllamaSource {
    client: Client,
    url: String,
}

impl OllamaSource {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            url: endpoint(base_url, "api/ps"),
        }
    }

    /// Ollama has no auth, the URL alone enables it
    pub fn from_config(config: &OllamaConfig, client: &Client) -> Option<Self> {
        non_empty(&config.url).map(|url| Self::new(client.clone(), url))
    }
}

#[async_trait]
impl MetricSource for OllamaSource {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn poll(&self) -> Result<SourceUpdate, SourceError> {
        let ps: PsResponse = fetch_json(self.client.get(&self.url)).await?;
        let bytes: u64 = ps.models.iter().map(|m| m.size_vram).sum();
        let gb = (bytes as f64 / BYTES_PER_GB * 10.0).round() / 10.0;

        Ok(SourceUpdate {
            vram_usage: Some(gb),
            ..Default::default()
        })
    }
}
