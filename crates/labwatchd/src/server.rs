//! HTTP server for labwatchd

use crate::actions::ActionDispatcher;
use crate::aggregator::{Aggregator, AggregatorSettings};
use crate::chaos::ChaosMonkey;
use crate::config::Config;
use crate::ingest::TelemetryStore;
use crate::metrics::LabMetrics;
use crate::middleware::MAX_BODY_SIZE;
use crate::routes;
use crate::sources::{build_sources, http_client, non_empty, ContainerHost, DockerHost};
use anyhow::{Context, Result};
use axum::{extract::DefaultBodyLimit, http::HeaderValue, Router};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub type AppStateArc = Arc<AppState>;

/// Application state shared across handlers
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub dispatcher: ActionDispatcher,
    pub telemetry: TelemetryStore,
    pub metrics: LabMetrics,
    /// Shared secret for telemetry pushes; `None` rejects all pushes
    pub ingestion_key: Option<String>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        aggregator: Aggregator,
        dispatcher: ActionDispatcher,
        metrics: LabMetrics,
        ingestion_key: Option<String>,
    ) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
            dispatcher,
            telemetry: TelemetryStore::new(),
            metrics,
            ingestion_key,
            start_time: Instant::now(),
        }
    }

    /// Wire sources, chaos monkey and dispatcher from config
    pub fn from_config(config: &Config) -> Result<Self> {
        let metrics = LabMetrics::new().context("Failed to register metrics")?;
        let timeout = config.server.upstream_timeout();
        let client = http_client(timeout).context("Failed to build HTTP client")?;

        let sources = build_sources(config, &client).context("Failed to build sources")?;

        let host = DockerHost::from_config(&config.container_host, &client, timeout)
            .map(|h| Arc::new(h) as Arc<dyn ContainerHost>);
        if host.is_none() {
            info!("No container host configured, chaos runs are simulated");
        }
        let monkey = ChaosMonkey::new(host, config.container_host.protected.clone());

        let aggregator = Aggregator::new(AggregatorSettings::from_config(config), sources, monkey)
            .with_metrics(metrics.clone());
        let dispatcher = ActionDispatcher::new(client, &config.webhook, &config.home_assistant)
            .with_metrics(metrics.clone());

        let ingestion_key = non_empty(&config.ingestion.key).map(str::to_string);
        if ingestion_key.is_none() {
            warn!("No ingestion key configured, telemetry pushes will be rejected");
        }

        Ok(Self::new(aggregator, dispatcher, metrics, ingestion_key))
    }
}

/// Build the router with all routes and layers
pub fn router(state: AppStateArc, cors_origins: &[String]) -> Router {
    let app = Router::new()
        .merge(routes::snapshot_routes())
        .merge(routes::control_routes())
        .merge(routes::ingestion_routes(&state))
        .merge(routes::health_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http());

    match cors_layer(cors_origins) {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

/// `*` allows any origin; unparsable origins are skipped
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    if origins.iter().any(|o| o == "*") {
        return Some(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

/// Run the HTTP server until ctrl-c
pub async fn run(state: AppState, bind: &str, cors_origins: &[String]) -> Result<()> {
    let app = router(Arc::new(state), cors_origins);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutting down gracefully");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_selection() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["*".to_string()]).is_some());
        assert!(cors_layer(&["http://dash.lan:3000".to_string()]).is_some());
    }

    #[tokio::test]
    async fn test_from_default_config() {
        let state = AppState::from_config(&Config::default()).unwrap();
        assert!(state.ingestion_key.is_none());
        assert!(state.aggregator.source_names().is_empty());
        assert!(!state.dispatcher.webhook_configured());
    }
}
