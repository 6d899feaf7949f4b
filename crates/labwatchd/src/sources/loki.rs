//! Loki critical log lines and failed-login count.

use async_trait::async_trait;
use labwatch_common::{now_millis, LogEntry, LogLevel, CRITICAL_LOG_CAPACITY};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use super::{endpoint, fetch_json, non_empty, MetricSource, SourceError, SourceUpdate};
use crate::config::LokiConfig;

/// How far back the log query looks
const LOOKBACK_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    data: QueryData<T>,
}

#[derive(Debug, Deserialize)]
struct QueryData<T> {
    #[serde(default = "Vec::new")]
    result: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Stream {
    #[serde(default)]
    stream: HashMap<String, String>,
    /// [timestamp_ns, line]
    #[serde(default)]
    values: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct Sample {
    /// [unix_seconds, "value"]
    value: (Value, String),
}

pub struct LokiSource {
    client: Client,
    range_url: String,
    instant_url: String,
    log_query: String,
    failed_login_query: Option<String>,
}

impl LokiSource {
    pub fn new(
        client: Client,
        base_url: &str,
        log_query: &str,
        failed_login_query: Option<&str>,
    ) -> Self {
        Self {
            client,
            range_url: endpoint(base_url, "loki/api/v1/query_range"),
            instant_url: endpoint(base_url, "loki/api/v1/query"),
            log_query: log_query.to_string(),
            failed_login_query: failed_login_query.map(str::to_string),
        }
    }

    pub fn from_config(config: &LokiConfig, client: &Client) -> Option<Self> {
        let url = non_empty(&config.url)?;
        Some(Self::new(
            client.clone(),
            url,
            &config.log_query,
            non_empty(&config.failed_login_query),
        ))
    }

    async fn recent_lines(&self) -> Result<Vec<LogEntry>, SourceError> {
        let now_ns = now_millis().saturating_mul(1_000_000);
        let start_ns = (now_millis() - LOOKBACK_MS).saturating_mul(1_000_000);
        let request = self.client.get(&self.range_url).query(&[
            ("query", self.log_query.clone()),
            ("limit", CRITICAL_LOG_CAPACITY.to_string()),
            ("direction", "backward".to_string()),
            ("start", start_ns.to_string()),
            ("end", now_ns.to_string()),
        ]);
        let response: QueryResponse<Stream> = fetch_json(request).await?;
        Ok(streams_to_entries(response.data.result))
    }

    async fn failed_logins(&self, query: &str) -> Result<u32, SourceError> {
        let request = self.client.get(&self.instant_url).query(&[("query", query)]);
        let response: QueryResponse<Sample> = fetch_json(request).await?;

        // No matching lines yields an empty vector rather than a zero sample
        let Some(sample) = response.data.result.first() else {
            return Ok(0);
        };
        let count: f64 = sample
            .value
            .1
            .trim()
            .parse()
            .map_err(|_| SourceError::Malformed(format!("sample value '{}'", sample.value.1)))?;
        Ok(count.max(0.0).round() as u32)
    }
}

fn streams_to_entries(streams: Vec<Stream>) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    for stream in streams {
        let label = stream
            .stream
            .get("level")
            .or_else(|| stream.stream.get("detected_level"))
            .cloned();
        for (ts_ns, line) in stream.values {
            let Ok(ns) = ts_ns.parse::<i64>() else {
                continue;
            };
            let level = match &label {
                Some(l) => LogLevel::infer(l),
                None => LogLevel::infer(&line),
            };
            entries.push(LogEntry::new(level, line.trim_end(), ns / 1_000_000));
        }
    }
    entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    entries.truncate(CRITICAL_LOG_CAPACITY);
    entries
}

#[async_trait]
impl MetricSource for LokiSource {
    fn name(&self) -> &'static str {
        "loki"
    }

    async fn poll(&self) -> Result<SourceUpdate, SourceError> {
        let (lines, failed) = match &self.failed_login_query {
            Some(query) => {
                let (lines, failed) = tokio::join!(self.recent_lines(), self.failed_logins(query));
                (lines, Some(failed))
            }
            None => (self.recent_lines().await, None),
        };

        let failed_logins = match failed {
            Some(Ok(count)) => Some(count),
            Some(Err(e)) => {
                if lines.is_err() {
                    return Err(e);
                }
                None
            }
            None => None,
        };

        let logs = match lines {
            Ok(logs) => logs,
            Err(e) if failed_logins.is_none() => return Err(e),
            Err(_) => Vec::new(),
        };

        Ok(SourceUpdate {
            failed_logins,
            logs,
            ..Default::default()
        })
    }
}
