//! Client against a live in-process daemon

use labwatchctl::LabwatchClient;
use labwatchd::actions::ActionDispatcher;
use labwatchd::chaos::ChaosMonkey;
use labwatchd::config::{HomeAssistantConfig, WebhookConfig};
use labwatchd::metrics::LabMetrics;
use labwatchd::server::router;
use labwatchd::sources::http_client;
use labwatchd::{Aggregator, AggregatorSettings, AppState};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const KEY: &str = "ctl-test-ingest-key";

async fn spawn_daemon() -> String {
    let metrics = LabMetrics::new().unwrap();
    let aggregator = Aggregator::new(AggregatorSettings::default(), Vec::new(), ChaosMonkey::simulated());
    let dispatcher = ActionDispatcher::new(
        http_client(Duration::from_secs(1)).unwrap(),
        &WebhookConfig::default(),
        &HomeAssistantConfig::default(),
    );
    let state = Arc::new(AppState::new(aggregator, dispatcher, metrics, Some(KEY.to_string())));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state, &[])).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_status_and_health() {
    let client = LabwatchClient::new(&spawn_daemon().await).unwrap();

    let snapshot = client.snapshot().await.unwrap();
    assert!(snapshot.dns_blocked.ends_with('%'));
    assert!(!snapshot.chaos_active);

    let raw = client.snapshot_raw().await.unwrap();
    assert_eq!(raw["success"], json!(true));

    let health = client.health().await.unwrap();
    assert_eq!(health.status, "ok");
    assert!(health.ingestion_enabled);
}

#[tokio::test]
async fn test_chaos_then_snapshot_shows_flag() {
    let client = LabwatchClient::new(&spawn_daemon().await).unwrap();

    let ack = client.chaos().await.unwrap();
    assert_eq!(ack.message, "Chaos Monkey Deployed");
    assert!(client.snapshot().await.unwrap().chaos_active);
}

#[tokio::test]
async fn test_push_and_read_back() {
    let client = LabwatchClient::new(&spawn_daemon().await).unwrap();

    let ack = client.push(&json!({ "cpuTemp": 58.0 }), KEY).await.unwrap();
    assert!(ack.success);
    assert_eq!(client.host().await.unwrap().cpu_temp(), Some(58.0));

    let err = client.push(&json!({ "cpuTemp": 1.0 }), "wrong").await.unwrap_err();
    assert!(err.to_string().contains("Invalid Authority"));
}

#[tokio::test]
async fn test_rejected_actions_surface_daemon_error() {
    let client = LabwatchClient::new(&spawn_daemon().await).unwrap();

    assert!(client.exec("restart-jellyfin").await.unwrap().success);

    let err = client.exec("rm -rf").await.unwrap_err();
    assert!(err.to_string().contains("400"));

    let err = client.toggle("NotAnEntity").await.unwrap_err();
    assert!(err.to_string().contains("invalid entity id"));
}

#[tokio::test]
async fn test_unreachable_daemon_is_explained() {
    let client = LabwatchClient::new("http://127.0.0.1:9").unwrap();
    let err = client.snapshot().await.unwrap_err();
    assert!(err.to_string().contains("Cannot reach labwatchd"));
}
