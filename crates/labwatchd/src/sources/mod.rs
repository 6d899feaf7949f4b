//! Upstream metric sources.
//!
//! Each homelab service the dashboard knows about gets one `MetricSource`
//! implementation. A source answers with the subset of snapshot fields it
//! can supply; the aggregator treats any error as "no data this round".
//!
//! Production code builds real sources from config with `build_sources`.
//! Tests use `FakeSource` with pre-configured responses.

pub mod docker;
pub mod home_assistant;
pub mod jellyfin;
pub mod loki;
pub mod ollama;
pub mod pihole;
pub mod proxmox;

use async_trait::async_trait;
use labwatch_common::LogEntry;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::Config;

pub use docker::{ContainerHost, ContainerSummary, DockerHost, FakeContainerHost};
pub use home_assistant::HomeAssistantSource;
pub use jellyfin::JellyfinSource;
pub use loki::LokiSource;
pub use ollama::OllamaSource;
pub use pihole::PiholeSource;
pub use proxmox::ProxmoxSource;

/// Why an upstream call produced nothing usable
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Partial snapshot contributed by one or more sources.
///
/// `None` means "not supplied"; the aggregator drifts those fields instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceUpdate {
    pub ups_watts: Option<f64>,
    pub pve_cpu: Option<f64>,
    pub pve_ram: Option<f64>,
    pub wan_down: Option<f64>,
    pub wan_up: Option<f64>,
    /// Percent, numeric
    pub dns_blocked: Option<f64>,
    pub failed_logins: Option<u32>,
    pub vram_usage: Option<f64>,
    pub active_transcodes: Option<u32>,
    pub logs: Vec<LogEntry>,
}

impl SourceUpdate {
    /// Fold another update in; fields it supplies win.
    pub fn merge(&mut self, other: SourceUpdate) {
        self.ups_watts = other.ups_watts.or(self.ups_watts);
        self.pve_cpu = other.pve_cpu.or(self.pve_cpu);
        self.pve_ram = other.pve_ram.or(self.pve_ram);
        self.wan_down = other.wan_down.or(self.wan_down);
        self.wan_up = other.wan_up.or(self.wan_up);
        self.dns_blocked = other.dns_blocked.or(self.dns_blocked);
        self.failed_logins = other.failed_logins.or(self.failed_logins);
        self.vram_usage = other.vram_usage.or(self.vram_usage);
        self.active_transcodes = other.active_transcodes.or(self.active_transcodes);
        self.logs.extend(other.logs);
    }
}

/// One upstream integration
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Short stable name, used in logs and metric labels
    fn name(&self) -> &'static str;

    /// Query the upstream once
    async fn poll(&self) -> Result<SourceUpdate, SourceError>;
}

/// Shared HTTP client for upstream calls
pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("labwatchd/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Join a base URL and a path without doubling slashes
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Config value if present and not blank
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Send, require a 2xx and decode the body
pub(crate) async fn fetch_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, SourceError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status(status));
    }
    Ok(response.json::<T>().await?)
}

/// Build every source whose configuration is complete.
pub fn build_sources(
    config: &Config,
    client: &Client,
) -> reqwest::Result<Vec<Arc<dyn MetricSource>>> {
    let mut sources: Vec<Arc<dyn MetricSource>> = Vec::new();
    let timeout = config.server.upstream_timeout();

    if let Some(source) = ProxmoxSource::from_config(&config.proxmox, client, timeout)? {
        sources.push(Arc::new(source));
    }
    if let Some(source) = PiholeSource::from_config(&config.pihole, client) {
        sources.push(Arc::new(source));
    }
    if let Some(source) = OllamaSource::from_config(&config.ollama, client) {
        sources.push(Arc::new(source));
    }
    if let Some(source) = JellyfinSource::from_config(&config.jellyfin, client) {
        sources.push(Arc::new(source));
    }
    if let Some(source) = HomeAssistantSource::from_config(&config.home_assistant, client) {
        sources.push(Arc::new(source));
    }
    if let Some(source) = LokiSource::from_config(&config.loki, client) {
        sources.push(Arc::new(source));
    }

    let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
    if names.is_empty() {
        info!("No upstream sources configured, serving drifted values only");
    } else {
        info!("Enabled sources: {}", names.join(", "));
    }

    Ok(sources)
}

// ============================================================================
// Fake Source (Testing)
// ============================================================================

/// Source returning a canned update, or failing when none is set
pub struct FakeSource {
    name: &'static str,
    response: Mutex<Option<SourceUpdate>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn ok(name: &'static str, update: SourceUpdate) -> Self {
        Self {
            name,
            response: Mutex::new(Some(update)),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            name,
            response: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering, to widen race windows in tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_response(&self, update: Option<SourceUpdate>) {
        if let Ok(mut slot) = self.response.lock() {
            *slot = update;
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricSource for FakeSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn poll(&self) -> Result<SourceUpdate, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let response = self
            .response
            .lock()
            .map_err(|_| SourceError::Malformed("fake source poisoned".to_string()))?
            .clone();
        response.ok_or_else(|| SourceError::Malformed(format!("{} unavailable", self.name)))
    }
}
