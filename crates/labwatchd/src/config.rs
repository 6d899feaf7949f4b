//! Configuration management for labwatchd.
//!
//! Loads settings from /etc/labwatch/config.toml (or `--config`), then lets
//! environment variables override upstream endpoints and credentials. A
//! source whose URL or credentials are missing after both layers is simply
//! not polled.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/labwatch/config.toml";

/// Bounds for the refresh throttle window
pub const MIN_THROTTLE_MS: u64 = 2_000;
pub const MAX_THROTTLE_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// HTTP server and refresh behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Minimum interval between live refreshes
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// How long chaosActive stays set after a trigger
    #[serde(default = "default_chaos_reset_secs")]
    pub chaos_reset_secs: u64,

    /// Per-request timeout for every upstream call
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    /// Origins allowed to call the API from a browser; empty disables CORS
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_bind() -> String {
    format!("0.0.0.0:{}", labwatch_common::DEFAULT_PORT)
}

fn default_throttle_ms() -> u64 {
    2_000
}

fn default_chaos_reset_secs() -> u64 {
    5
}

fn default_upstream_timeout_secs() -> u64 {
    3
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            throttle_ms: default_throttle_ms(),
            chaos_reset_secs: default_chaos_reset_secs(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn chaos_reset(&self) -> Duration {
        Duration::from_secs(self.chaos_reset_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

/// Static values folded into the snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_cost_per_kwh")]
    pub cost_per_kwh: f64,

    /// Upper bound for drifted VRAM usage
    #[serde(default = "default_vram_capacity_gb")]
    pub vram_capacity_gb: f64,
}

fn default_cost_per_kwh() -> f64 {
    0.14
}

fn default_vram_capacity_gb() -> f64 {
    24.0
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            cost_per_kwh: default_cost_per_kwh(),
            vram_capacity_gb: default_vram_capacity_gb(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxmoxConfig {
    pub url: Option<String>,
    pub node: Option<String>,
    pub token_id: Option<String>,
    pub token_secret: Option<String>,
    /// Proxmox ships a self-signed certificate by default
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PiholeConfig {
    pub url: Option<String>,
    pub api_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JellyfinConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HomeAssistantConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    /// Entity reporting UPS load in watts, e.g. sensor.ups_load
    pub ups_sensor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LokiConfig {
    pub url: Option<String>,

    /// LogQL selecting lines worth showing on the dashboard
    #[serde(default = "default_loki_log_query")]
    pub log_query: String,

    /// LogQL instant query yielding a single failed-login count
    #[serde(default = "default_loki_failed_login_query")]
    pub failed_login_query: Option<String>,
}

fn default_loki_log_query() -> String {
    r#"{job=~".+"} |~ "(?i)(crit|error|fatal|panic)""#.to_string()
}

fn default_loki_failed_login_query() -> Option<String> {
    Some(r#"sum(count_over_time({job=~".+"} |= "Failed password" [24h]))"#.to_string())
}

impl Default for LokiConfig {
    fn default() -> Self {
        Self {
            url: None,
            log_query: default_loki_log_query(),
            failed_login_query: default_loki_failed_login_query(),
        }
    }
}

/// Docker Engine API endpoint used by the chaos monkey
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHostConfig {
    pub url: Option<String>,

    /// Containers whose name contains any of these are never stopped
    #[serde(default = "default_protected")]
    pub protected: Vec<String>,

    /// Seconds Docker waits before killing a stopping container
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
}

fn default_stop_grace_secs() -> u64 {
    10
}

fn default_protected() -> Vec<String> {
    ["labwatch", "proxy", "pihole", "postgres", "vault", "portainer"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ContainerHostConfig {
    fn default() -> Self {
        Self {
            url: None,
            protected: default_protected(),
            stop_grace_secs: default_stop_grace_secs(),
        }
    }
}

/// External homelab agent receiving forwarded actions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Shared secret expected in x-api-key; unset rejects every push
    pub key: Option<String>,
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub proxmox: ProxmoxConfig,
    #[serde(default)]
    pub pihole: PiholeConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub jellyfin: JellyfinConfig,
    #[serde(default)]
    pub home_assistant: HomeAssistantConfig,
    #[serde(default)]
    pub loki: LokiConfig,
    #[serde(default)]
    pub container_host: ContainerHostConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

impl Config {
    /// Load config, overlay the process environment and normalize.
    ///
    /// An explicit path must exist. Without one the default path is tried
    /// and defaults are used when it is absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::load_from_path(p)?,
            None if Path::new(CONFIG_PATH).exists() => Self::load_from_path(Path::new(CONFIG_PATH))?,
            None => {
                info!("No config at {}, using defaults", CONFIG_PATH);
                Config::default()
            }
        };
        config.apply_env_with(|key| std::env::var(key).ok());
        config.normalize();
        Ok(config)
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Override fields from environment variables.
    ///
    /// Takes the lookup as a closure so tests don't touch the real environment.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |slot: &mut Option<String>, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *slot = Some(value);
            }
        };

        set(&mut self.webhook.url, "HOMELAB_TUNNEL_URL");
        set(&mut self.webhook.secret, "HOMELAB_EXECUTION_SECRET");
        set(&mut self.ingestion.key, "HOMELAB_INGESTION_KEY");
        set(&mut self.proxmox.url, "PROXMOX_URL");
        set(&mut self.proxmox.node, "PROXMOX_NODE");
        set(&mut self.proxmox.token_id, "PROXMOX_TOKEN_ID");
        set(&mut self.proxmox.token_secret, "PROXMOX_TOKEN_SECRET");
        set(&mut self.pihole.url, "PIHOLE_URL");
        set(&mut self.pihole.api_token, "PIHOLE_API_TOKEN");
        set(&mut self.ollama.url, "OLLAMA_URL");
        set(&mut self.jellyfin.url, "JELLYFIN_URL");
        set(&mut self.jellyfin.api_key, "JELLYFIN_API_KEY");
        set(&mut self.home_assistant.url, "HOME_ASSISTANT_URL");
        set(&mut self.home_assistant.token, "HOME_ASSISTANT_TOKEN");
        set(&mut self.home_assistant.ups_sensor, "HOME_ASSISTANT_UPS_SENSOR");
        set(&mut self.loki.url, "LOKI_URL");
        set(&mut self.container_host.url, "DOCKER_HOST_URL");
    }

    /// Pull out-of-range values back into bounds.
    pub fn normalize(&mut self) {
        let throttle = self
            .server
            .throttle_ms
            .clamp(MIN_THROTTLE_MS, MAX_THROTTLE_MS);
        if throttle != self.server.throttle_ms {
            warn!(
                "throttle_ms {} out of range, using {}",
                self.server.throttle_ms, throttle
            );
            self.server.throttle_ms = throttle;
        }

        if self.server.upstream_timeout_secs == 0 {
            warn!("upstream_timeout_secs must be positive, using default");
            self.server.upstream_timeout_secs = default_upstream_timeout_secs();
        }

        let vram = self.snapshot.vram_capacity_gb;
        if !vram.is_finite() || vram <= 0.0 {
            warn!("vram_capacity_gb must be positive, using default");
            self.snapshot.vram_capacity_gb = default_vram_capacity_gb();
        }

        // A non-finite rate would serialize as null in every snapshot
        let rate = self.snapshot.cost_per_kwh;
        if !rate.is_finite() || rate < 0.0 {
            warn!("cost_per_kwh {} is not a valid rate, using default", rate);
            self.snapshot.cost_per_kwh = default_cost_per_kwh();
        }
    }
}
