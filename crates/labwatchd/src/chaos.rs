//! Chaos monkey: stop one non-essential container on demand.

use labwatch_common::{LogEntry, LogLevel};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{info, warn};

use crate::sources::{ContainerHost, ContainerSummary};

/// Names used when no real container could be touched
const SIMULATED_VICTIMS: &[&str] = &["nginx-proxy", "grafana", "uptime-kuma", "homepage"];

/// What a chaos run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChaosOutcome {
    /// A real container was stopped
    Stopped { name: String },
    /// Nothing was stopped; the dashboard gets a stand-in entry
    Simulated { name: String, reason: String },
}

impl ChaosOutcome {
    pub fn victim(&self) -> &str {
        match self {
            ChaosOutcome::Stopped { name } | ChaosOutcome::Simulated { name, .. } => name,
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, ChaosOutcome::Simulated { .. })
    }

    pub fn log_entry(&self, now_ms: i64) -> LogEntry {
        match self {
            ChaosOutcome::Stopped { name } => LogEntry::new(
                LogLevel::Critical,
                format!("Chaos Monkey stopped container '{}'", name),
                now_ms,
            ),
            ChaosOutcome::Simulated { name, reason } => LogEntry::new(
                LogLevel::Warn,
                format!("Chaos Monkey (simulated) killed '{}': {}", name, reason),
                now_ms,
            ),
        }
    }
}

pub struct ChaosMonkey {
    host: Option<Arc<dyn ContainerHost>>,
    protected: Vec<String>,
}

impl ChaosMonkey {
    pub fn new(host: Option<Arc<dyn ContainerHost>>, protected: Vec<String>) -> Self {
        Self {
            host,
            protected: protected
                .into_iter()
                .map(|p| p.to_ascii_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Monkey without a container host; every run is simulated
    pub fn simulated() -> Self {
        Self::new(None, Vec::new())
    }

    /// Case-insensitive substring match against the protected list
    pub fn is_protected(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.protected.iter().any(|p| name.contains(p.as_str()))
    }

    /// Pick and stop one unprotected container. Never fails: anything that
    /// goes wrong turns into a simulated outcome.
    pub async fn unleash(&self) -> ChaosOutcome {
        let Some(host) = &self.host else {
            return simulated("no container host configured");
        };

        let running = match host.list_running().await {
            Ok(running) => running,
            Err(e) => {
                warn!("Chaos Monkey could not list containers: {}", e);
                return simulated("container host unreachable");
            }
        };

        let candidates: Vec<ContainerSummary> = running
            .into_iter()
            .filter(|c| !self.is_protected(&c.name))
            .collect();

        let Some(victim) = pick(&candidates) else {
            return simulated("every running container is protected");
        };

        match host.stop(&victim).await {
            Ok(()) => {
                info!("Chaos Monkey stopped {} ({})", victim.name, victim.id);
                ChaosOutcome::Stopped { name: victim.name }
            }
            Err(e) => {
                warn!("Chaos Monkey failed to stop {}: {}", victim.name, e);
                ChaosOutcome::Simulated {
                    name: victim.name,
                    reason: "stop request failed".to_string(),
                }
            }
        }
    }
}

fn pick(candidates: &[ContainerSummary]) -> Option<ContainerSummary> {
    candidates.choose(&mut rand::thread_rng()).cloned()
}

fn simulated(reason: &str) -> ChaosOutcome {
    let name = SIMULATED_VICTIMS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("nginx-proxy");
    ChaosOutcome::Simulated {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
