//! Upstream adapters against a local fake homelab

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use labwatch_common::MetricsSnapshot;
use labwatchd::actions::ActionDispatcher;
use labwatchd::chaos::{ChaosMonkey, ChaosOutcome};
use labwatchd::config::Config;
use labwatchd::sources::{
    build_sources, http_client, ContainerHost, DockerHost, LokiSource, MetricSource, SourceError,
};
use labwatchd::{Aggregator, AggregatorSettings};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const PVE_TOKEN: &str = "PVEAPIToken=root@pam!labwatch=0b7c-secret";

/// Requests the fake homelab saw, one line each
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn push(&self, line: String) {
        self.0.lock().unwrap().push(line);
    }

    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

fn bearer(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string()
}

async fn pve_status(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    if bearer(&headers) != PVE_TOKEN {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(json!({
        "data": { "cpu": 0.25, "memory": { "used": 8.0, "total": 32.0 }, "uptime": 86400 }
    })))
}

async fn pihole_summary(Query(params): Query<HashMap<String, String>>) -> Result<Json<Value>, StatusCode> {
    if params.get("auth").map(String::as_str) != Some("pihole-token") {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(Json(json!({ "domains_being_blocked": 120000, "ads_percentage_today": "21.5" })))
}

async fn ollama_ps() -> Json<Value> {
    Json(json!({
        "models": [
            { "name": "llama3:8b", "size_vram": 2147483648u64 },
            { "name": "nomic-embed-text", "size_vram": 1073741824u64 }
        ]
    }))
}

async fn jellyfin_sessions(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    if headers.get("x-emby-token").is_none() {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(json!([
        { "UserName": "alice", "TranscodingInfo": { "Bitrate": 8000000 } },
        { "UserName": "bob", "TranscodingInfo": null },
        { "UserName": "carol" }
    ])))
}

async fn ha_state(Path(entity): Path<String>) -> Result<Json<Value>, StatusCode> {
    if entity != "sensor.ups_load" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!({ "entity_id": entity, "state": "312.5" })))
}

async fn ha_toggle(
    State(recorder): State<Recorder>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    recorder.push(format!(
        "toggle {} {}",
        body["entity_id"].as_str().unwrap_or("?"),
        bearer(&headers)
    ));
    Json(json!([]))
}

async fn loki_range() -> Json<Value> {
    Json(json!({
        "status": "success",
        "data": {
            "resultType": "streams",
            "result": [{
                "stream": { "job": "sshd", "level": "error" },
                "values": [["1700000003000000000", "sshd: maximum authentication attempts exceeded"]]
            }]
        }
    }))
}

async fn loki_instant() -> Json<Value> {
    Json(json!({
        "status": "success",
        "data": { "resultType": "vector", "result": [{ "metric": {}, "value": [1700000000.5, "7"] }] }
    }))
}

async fn containers() -> Json<Value> {
    Json(json!([
        { "Id": "aaa111", "Names": ["/nginx-proxy"] },
        { "Id": "bbb222", "Names": ["/grafana"] }
    ]))
}

async fn stop_container(State(recorder): State<Recorder>, Path(id): Path<String>) -> StatusCode {
    recorder.push(format!("stop {}", id));
    StatusCode::NO_CONTENT
}

async fn webhook(
    State(recorder): State<Recorder>,
    Path(action): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    recorder.push(format!("webhook {} {}", action, bearer(&headers)));
    StatusCode::OK
}

async fn spawn_homelab() -> (String, Recorder) {
    let recorder = Recorder::default();
    let app = Router::new()
        .route("/api2/json/nodes/pve/status", get(pve_status))
        .route("/admin/api.php", get(pihole_summary))
        .route("/api/ps", get(ollama_ps))
        .route("/Sessions", get(jellyfin_sessions))
        .route("/api/states/:entity", get(ha_state))
        .route("/api/services/homeassistant/toggle", post(ha_toggle))
        .route("/loki/api/v1/query_range", get(loki_range))
        .route("/loki/api/v1/query", get(loki_instant))
        .route("/containers/json", get(containers))
        .route("/containers/:id/stop", post(stop_container))
        .route("/webhook/:action", post(webhook))
        .with_state(recorder.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), recorder)
}

fn full_config(base: &str) -> Config {
    let mut config = Config::default();
    let url = Some(base.to_string());

    config.proxmox.url = url.clone();
    config.proxmox.node = Some("pve".to_string());
    config.proxmox.token_id = Some("root@pam!labwatch".to_string());
    config.proxmox.token_secret = Some("0b7c-secret".to_string());
    config.pihole.url = url.clone();
    config.pihole.api_token = Some("pihole-token".to_string());
    config.ollama.url = url.clone();
    config.jellyfin.url = url.clone();
    config.jellyfin.api_key = Some("jf-key".to_string());
    config.home_assistant.url = url.clone();
    config.home_assistant.token = Some("ha-token".to_string());
    config.home_assistant.ups_sensor = Some("sensor.ups_load".to_string());
    config.loki.url = url.clone();
    config.container_host.url = url.clone();
    config.webhook.url = url;
    config.webhook.secret = Some("exec-secret".to_string());
    config
}

fn stale_snapshot() -> MetricsSnapshot {
    MetricsSnapshot::with_defaults(labwatch_common::now_millis() - 60_000)
}

#[tokio::test]
async fn test_live_refresh_uses_every_source() {
    let (base, _) = spawn_homelab().await;
    let config = full_config(&base);
    let client = http_client(Duration::from_secs(2)).unwrap();

    let sources = build_sources(&config, &client).unwrap();
    assert_eq!(sources.len(), 6);

    let aggregator = Aggregator::new(AggregatorSettings::from_config(&config), sources, ChaosMonkey::simulated())
        .with_initial_snapshot(stale_snapshot());
    let snap = aggregator.snapshot().await;

    assert_eq!(snap.pve_cpu, 25.0);
    assert_eq!(snap.pve_ram, 25.0);
    assert_eq!(snap.dns_blocked, "21.5%");
    assert_eq!(snap.vram_usage, 3.0);
    assert_eq!(snap.active_transcodes, 1);
    assert_eq!(snap.ups_watts, 312.5);
    assert_eq!(snap.failed_logins, 7);
    let latest = snap.critical_logs.latest().unwrap();
    assert!(latest.text.contains("maximum authentication attempts"));
    assert_eq!(latest.timestamp, 1_700_000_003_000);
}

#[tokio::test]
async fn test_bad_proxmox_token_is_a_status_error() {
    let (base, _) = spawn_homelab().await;
    let mut config = Config::default();
    config.proxmox.url = Some(base);
    config.proxmox.node = Some("pve".to_string());
    config.proxmox.token_id = Some("root@pam!labwatch".to_string());
    config.proxmox.token_secret = Some("wrong".to_string());

    let client = http_client(Duration::from_secs(2)).unwrap();
    let sources = build_sources(&config, &client).unwrap();
    assert_eq!(sources.len(), 1);

    match sources[0].poll().await {
        Err(SourceError::Status(status)) => assert_eq!(status.as_u16(), 401),
        other => panic!("expected status error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_sources_without_credentials_are_not_built() {
    let mut config = Config::default();
    let url = Some("http://127.0.0.1:9".to_string());
    config.proxmox.url = url.clone();
    config.pihole.url = url.clone();
    config.jellyfin.url = url.clone();
    config.home_assistant.url = url.clone();
    config.home_assistant.token = Some("ha-token".to_string());
    config.ollama.url = url;

    let client = http_client(Duration::from_secs(1)).unwrap();
    let sources = build_sources(&config, &client).unwrap();
    let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["ollama"]);
}

#[tokio::test]
async fn test_unreachable_upstream_still_serves_snapshot() {
    // Grab a free port, then close it
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = full_config(&format!("http://127.0.0.1:{}", port));
    let client = http_client(Duration::from_millis(500)).unwrap();
    let sources = build_sources(&config, &client).unwrap();

    let aggregator = Aggregator::new(AggregatorSettings::from_config(&config), sources, ChaosMonkey::simulated())
        .with_initial_snapshot(stale_snapshot());
    let before = aggregator.current().await.last_updated;
    let snap = aggregator.snapshot().await;

    assert!(snap.last_updated > before);
    assert!((0.0..=100.0).contains(&snap.pve_cpu));
    assert!(snap.dns_blocked.ends_with('%'));
}

#[tokio::test]
async fn test_docker_host_and_chaos_monkey() {
    let (base, recorder) = spawn_homelab().await;
    let config = full_config(&base);
    let client = http_client(Duration::from_secs(2)).unwrap();

    let host = DockerHost::from_config(&config.container_host, &client, Duration::from_secs(2)).unwrap();
    let running = host.list_running().await.unwrap();
    let names: Vec<&str> = running.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["nginx-proxy", "grafana"]);

    let monkey = ChaosMonkey::new(Some(Arc::new(host)), config.container_host.protected.clone());
    let outcome = monkey.unleash().await;
    assert_eq!(outcome, ChaosOutcome::Stopped { name: "grafana".to_string() });
    assert_eq!(recorder.lines(), vec!["stop bbb222".to_string()]);
}

#[tokio::test]
async fn test_webhook_and_toggle_delivery() {
    let (base, recorder) = spawn_homelab().await;
    let config = full_config(&base);
    let client = http_client(Duration::from_secs(2)).unwrap();
    let dispatcher = ActionDispatcher::new(client, &config.webhook, &config.home_assistant);

    let handle = dispatcher.dispatch_webhook("reboot").unwrap().unwrap();
    handle.await.unwrap();

    let status = dispatcher.send_toggle("light.server_rack").await.unwrap();
    assert!(status.is_success());

    assert_eq!(
        recorder.lines(),
        vec![
            "webhook reboot Bearer exec-secret".to_string(),
            "toggle light.server_rack Bearer ha-token".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_slow_container_stop_is_not_reported_as_failure() {
    async fn slow_stop(State(recorder): State<Recorder>, Path(id): Path<String>) -> StatusCode {
        tokio::time::sleep(Duration::from_millis(800)).await;
        recorder.push(format!("stop {}", id));
        StatusCode::NO_CONTENT
    }

    let recorder = Recorder::default();
    let app = Router::new()
        .route("/containers/json", get(containers))
        .route("/containers/:id/stop", post(slow_stop))
        .with_state(recorder.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Client timeout is shorter than the stop, the grace period is not
    let timeout = Duration::from_millis(300);
    let host = DockerHost::new(http_client(timeout).unwrap(), &base, timeout)
        .with_stop_grace(Duration::from_secs(1));
    let monkey = ChaosMonkey::new(Some(Arc::new(host)), vec!["proxy".to_string()]);

    let started = Instant::now();
    let outcome = monkey.unleash().await;
    assert_eq!(outcome, ChaosOutcome::Stopped { name: "grafana".to_string() });
    assert!(started.elapsed() >= Duration::from_millis(800));
    assert_eq!(recorder.lines(), vec!["stop bbb222".to_string()]);
}

#[derive(Clone, Copy)]
enum LokiFailure {
    Range,
    Instant,
    Both,
}

async fn spawn_flaky_loki(failure: LokiFailure) -> String {
    let range = get(move || async move {
        match failure {
            LokiFailure::Range | LokiFailure::Both => Err(StatusCode::INTERNAL_SERVER_ERROR),
            LokiFailure::Instant => Ok(loki_range().await),
        }
    });
    let instant = get(move || async move {
        match failure {
            LokiFailure::Instant | LokiFailure::Both => Err(StatusCode::INTERNAL_SERVER_ERROR),
            LokiFailure::Range => Ok(loki_instant().await),
        }
    });
    let app = Router::new()
        .route("/loki/api/v1/query_range", range)
        .route("/loki/api/v1/query", instant);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn loki_at(base: &str) -> LokiSource {
    LokiSource::new(
        http_client(Duration::from_secs(2)).unwrap(),
        base,
        r#"{level=~"error|critical"}"#,
        Some(r#"count_over_time({job="sshd"} |= "authentication" [1h])"#),
    )
}

#[tokio::test]
async fn test_loki_keeps_logs_when_count_query_fails() {
    let loki = loki_at(&spawn_flaky_loki(LokiFailure::Instant).await);
    let update = loki.poll().await.unwrap();

    assert_eq!(update.failed_logins, None);
    assert_eq!(update.logs.len(), 1);
    assert!(update.logs[0].text.contains("maximum authentication attempts"));
}

#[tokio::test]
async fn test_loki_keeps_count_when_log_query_fails() {
    let loki = loki_at(&spawn_flaky_loki(LokiFailure::Range).await);
    let update = loki.poll().await.unwrap();

    assert_eq!(update.failed_logins, Some(7));
    assert!(update.logs.is_empty());
}

#[tokio::test]
async fn test_loki_fails_when_both_queries_fail() {
    let loki = loki_at(&spawn_flaky_loki(LokiFailure::Both).await);
    match loki.poll().await {
        Err(SourceError::Status(status)) => assert_eq!(status.as_u16(), 500),
        other => panic!("expected upstream 500, got {:?}", other.map(|u| u.failed_logins)),
    }
}
