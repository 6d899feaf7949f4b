//! Container host access for the chaos monkey.
//!
//! Talks to the Docker Engine API over plain HTTP, typically through a
//! socket proxy that only exposes the list and stop endpoints.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;

use super::{endpoint, fetch_json, non_empty, SourceError};
use crate::config::ContainerHostConfig;

/// A running container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ApiContainer {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
}

impl From<ApiContainer> for ContainerSummary {
    fn from(c: ApiContainer) -> Self {
        let name = c
            .names
            .first()
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| c.id.chars().take(12).collect());
        Self { id: c.id, name }
    }
}

/// Something that can list and stop containers
#[async_trait]
pub trait ContainerHost: Send + Sync {
    async fn list_running(&self) -> Result<Vec<ContainerSummary>, SourceError>;

    async fn stop(&self, container: &ContainerSummary) -> Result<(), SourceError>;
}

pub struct DockerHost {
    client: Client,
    base_url: String,
    /// How long Docker waits before killing a stopping container
    stop_grace: Duration,
    /// Client timeout; a stop request gets this on top of the grace period
    request_timeout: Duration,
}

impl DockerHost {
    pub fn new(client: Client, base_url: &str, request_timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            stop_grace: Duration::from_secs(10),
            request_timeout,
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn from_config(
        config: &ContainerHostConfig,
        client: &Client,
        request_timeout: Duration,
    ) -> Option<Self> {
        non_empty(&config.url).map(|url| {
            Self::new(client.clone(), url, request_timeout)
                .with_stop_grace(Duration::from_secs(config.stop_grace_secs))
        })
    }

    /// Docker holds the stop request open for up to the grace period
    fn stop_timeout(&self) -> Duration {
        self.stop_grace + self.request_timeout
    }
}

#[async_trait]
impl ContainerHost for DockerHost {
    async fn list_running(&self) -> Result<Vec<ContainerSummary>, SourceError> {
        // Without all=1 the API returns running containers only
        let request = self.client.get(endpoint(&self.base_url, "containers/json"));
        let containers: Vec<ApiContainer> = fetch_json(request).await?;
        Ok(containers.into_iter().map(ContainerSummary::from).collect())
    }

    async fn stop(&self, container: &ContainerSummary) -> Result<(), SourceError> {
        let url = endpoint(&self.base_url, &format!("containers/{}/stop", container.id));
        let response = self
            .client
            .post(url)
            .query(&[("t", self.stop_grace.as_secs())])
            .timeout(self.stop_timeout())
            .send()
            .await?;

        match response.status() {
            // 304: already stopped, which is what we wanted anyway
            s if s.is_success() || s == StatusCode::NOT_MODIFIED => Ok(()),
            s => Err(SourceError::Status(s)),
        }
    }
}

// ============================================================================
// Fake Container Host (Testing)
// ============================================================================

/// In-memory container host; `unreachable()` fails every call
pub struct FakeContainerHost {
    running: Mutex<Vec<ContainerSummary>>,
    stopped: Mutex<Vec<String>>,
    reachable: bool,
}

impl FakeContainerHost {
    pub fn with_containers(names: &[&str]) -> Self {
        let running = names
            .iter()
            .enumerate()
            .map(|(i, name)| ContainerSummary {
                id: format!("{:012x}", i + 1),
                name: name.to_string(),
            })
            .collect();
        Self {
            running: Mutex::new(running),
            stopped: Mutex::new(Vec::new()),
            reachable: true,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            running: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
            reachable: false,
        }
    }

    /// Names of containers stopped so far
    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn check_reachable(&self) -> Result<(), SourceError> {
        if self.reachable {
            Ok(())
        } else {
            Err(SourceError::Status(StatusCode::BAD_GATEWAY))
        }
    }
}

#[async_trait]
impl ContainerHost for FakeContainerHost {
    async fn list_running(&self) -> Result<Vec<ContainerSummary>, SourceError> {
        self.check_reachable()?;
        Ok(self.running.lock().map(|r| r.clone()).unwrap_or_default())
    }

    async fn stop(&self, container: &ContainerSummary) -> Result<(), SourceError> {
        self.check_reachable()?;
        if let Ok(mut running) = self.running.lock() {
            running.retain(|c| c.id != container.id);
        }
        if let Ok(mut stopped) = self.stopped.lock() {
            stopped.push(container.name.clone());
        }
        Ok(())
    }
}
