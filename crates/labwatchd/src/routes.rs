//! API routes for labwatchd

use crate::error::{parse_json, ApiError};
use crate::middleware::require_ingestion_key;
use crate::server::AppStateArc;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use labwatch_common::{
    ActionRequest, ApiEnvelope, HealthResponse, HostTelemetry, IngestAck, MessageAck,
    MetricsSnapshot, SuccessAck, VERSION,
};
use serde_json::Value;
use tracing::error;

/// Message returned once the chaos monkey has run
pub const CHAOS_DEPLOYED: &str = "Chaos Monkey Deployed";

// ============================================================================
// Snapshot Routes
// ============================================================================

pub fn snapshot_routes() -> Router<AppStateArc> {
    Router::new().route(
        "/api/god-tier-metrics",
        get(get_snapshot).post(control),
    )
}

async fn get_snapshot(State(state): State<AppStateArc>) -> Json<ApiEnvelope<MetricsSnapshot>> {
    Json(ApiEnvelope::ok(state.aggregator.snapshot().await))
}

async fn control(
    State(state): State<AppStateArc>,
    body: Bytes,
) -> Result<Json<MessageAck>, ApiError> {
    let request: Value = parse_json(&body, "Malformed request body")?;
    let action = request.get("action").and_then(Value::as_str).unwrap_or_default();

    match action {
        "trigger_chaos" => {
            // Detached so a client hanging up cannot cancel a half-done run
            let aggregator = state.aggregator.clone();
            tokio::spawn(async move { aggregator.trigger_chaos().await })
                .await
                .map_err(|e| {
                    error!("Chaos task failed: {}", e);
                    ApiError::Internal("Middleware Failed".to_string())
                })?;
            Ok(Json(MessageAck::ok(CHAOS_DEPLOYED)))
        }
        "ha_toggle" => {
            let entity_id = request
                .get("entity_id")
                .and_then(Value::as_str)
                .ok_or_else(|| ApiError::bad_request("Missing entity_id"))?;
            state.dispatcher.dispatch_toggle(entity_id)?;
            Ok(Json(MessageAck::ok(format!("Toggle dispatched for {}", entity_id))))
        }
        _ => Err(ApiError::bad_request("Unknown Action")),
    }
}

// ============================================================================
// Control Routes
// ============================================================================

pub fn control_routes() -> Router<AppStateArc> {
    Router::new().route("/api/docker-control", post(docker_control))
}

async fn docker_control(
    State(state): State<AppStateArc>,
    body: Bytes,
) -> Result<Json<SuccessAck>, ApiError> {
    let request: ActionRequest = parse_json(&body, "Malformed request body")?;
    state.dispatcher.dispatch_webhook(&request.action)?;
    Ok(Json(SuccessAck::ok()))
}

// ============================================================================
// Ingestion Routes
// ============================================================================

/// Takes the state so the key check can run as a route layer on POST only
pub fn ingestion_routes(state: &AppStateArc) -> Router<AppStateArc> {
    Router::new().route(
        "/api/metrics",
        get(host_telemetry).merge(post(push_telemetry).route_layer(
            middleware::from_fn_with_state(state.clone(), require_ingestion_key),
        )),
    )
}

async fn host_telemetry(State(state): State<AppStateArc>) -> Json<HostTelemetry> {
    Json(state.telemetry.current().await)
}

async fn push_telemetry(
    State(state): State<AppStateArc>,
    body: Bytes,
) -> Result<Json<IngestAck>, ApiError> {
    let payload = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(HostTelemetry::from_value);
    let Some(telemetry) = payload else {
        state.metrics.record_ingest("malformed");
        return Err(ApiError::bad_request("Malformed payload"));
    };

    let echo = telemetry.as_value();
    state.telemetry.store(telemetry).await;
    state.metrics.record_ingest("ok");

    Ok(Json(IngestAck {
        success: true,
        telemetry: echo,
    }))
}

// ============================================================================
// Health Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
}

async fn health(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: VERSION.to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        sources: state
            .aggregator
            .source_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        webhook_configured: state.dispatcher.webhook_configured(),
        ingestion_enabled: state.ingestion_key.is_some(),
        last_push: state.telemetry.last_received_at().await,
    })
}

async fn prometheus_metrics(State(state): State<AppStateArc>) -> impl IntoResponse {
    match state.metrics.export() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!("Metrics export failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
