//! Telemetry aggregator.
//!
//! Owns the cached `MetricsSnapshot`. Reads refresh it at most once per
//! throttle window by polling every configured source in parallel; fields
//! no source supplied drift from their previous value so the dashboard
//! always has something plausible to draw.
//!
//! Concurrency: the snapshot sits behind a tokio `RwLock` that is never
//! held across a network await. Refreshes are single-flighted through
//! `refresh_gate`; a caller that waited on the gate re-checks staleness
//! and skips the fetch if someone else already refreshed.

use futures::future::join_all;
use labwatch_common::{now_millis, ChaosToken, LogEntry, MetricsSnapshot};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::chaos::{ChaosMonkey, ChaosOutcome};
use crate::config::Config;
use crate::drift::apply_update;
use crate::metrics::LabMetrics;
use crate::sources::{MetricSource, SourceUpdate};

/// Tunables taken from config
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub throttle: Duration,
    pub chaos_reset: Duration,
    pub vram_capacity_gb: f64,
    pub cost_per_kwh: f64,
}

impl AggregatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            throttle: config.server.throttle(),
            chaos_reset: config.server.chaos_reset(),
            vram_capacity_gb: config.snapshot.vram_capacity_gb,
            cost_per_kwh: config.snapshot.cost_per_kwh,
        }
    }
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

struct AggregatorState {
    snapshot: MetricsSnapshot,
    chaos: ChaosToken,
}

pub struct Aggregator {
    state: RwLock<AggregatorState>,
    refresh_gate: Mutex<()>,
    sources: Vec<Arc<dyn MetricSource>>,
    monkey: ChaosMonkey,
    settings: AggregatorSettings,
    rng: std::sync::Mutex<StdRng>,
    metrics: Option<LabMetrics>,
}

impl Aggregator {
    pub fn new(
        settings: AggregatorSettings,
        sources: Vec<Arc<dyn MetricSource>>,
        monkey: ChaosMonkey,
    ) -> Self {
        let mut snapshot = MetricsSnapshot::with_defaults(now_millis());
        snapshot.cost_per_kwh = settings.cost_per_kwh;

        Self {
            state: RwLock::new(AggregatorState {
                snapshot,
                chaos: ChaosToken::new(),
            }),
            refresh_gate: Mutex::new(()),
            sources,
            monkey,
            settings,
            rng: std::sync::Mutex::new(StdRng::from_entropy()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: LabMetrics) -> Self {
        metrics.observe_snapshot(&self.state.get_mut().snapshot);
        self.metrics = Some(metrics);
        self
    }

    /// Replace the starting snapshot, e.g. to begin already stale
    pub fn with_initial_snapshot(mut self, snapshot: MetricsSnapshot) -> Self {
        self.state.get_mut().snapshot = snapshot;
        self
    }

    /// Deterministic drift
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = std::sync::Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    async fn is_stale(&self) -> bool {
        let last = self.state.read().await.snapshot.last_updated;
        let throttle_ms = i64::try_from(self.settings.throttle.as_millis()).unwrap_or(i64::MAX);
        now_millis().saturating_sub(last) > throttle_ms
    }

    /// Refresh from upstream if the throttle window has passed.
    ///
    /// Returns whether a refresh happened.
    pub async fn refresh(&self) -> bool {
        if !self.is_stale().await {
            return false;
        }

        let _gate = self.refresh_gate.lock().await;
        if !self.is_stale().await {
            debug!("Refresh already done by a concurrent caller");
            return false;
        }

        let update = self.collect().await;
        self.merge(update).await;
        true
    }

    /// Poll every source concurrently; failures become missing fields.
    async fn collect(&self) -> SourceUpdate {
        let results = join_all(
            self.sources
                .iter()
                .map(|source| async move { (source.name(), source.poll().await) }),
        )
        .await;

        let mut update = SourceUpdate::default();
        for (name, result) in results {
            if let Some(metrics) = &self.metrics {
                metrics.record_fetch(name, result.is_ok());
            }
            match result {
                Ok(partial) => update.merge(partial),
                Err(e) => debug!(source = name, "Fetch failed, drifting: {}", e),
            }
        }
        update
    }

    /// Fold an update into the snapshot and bump `last_updated`.
    pub async fn merge(&self, update: SourceUpdate) {
        let mut state = self.state.write().await;
        {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            apply_update(
                &mut state.snapshot,
                &update,
                self.settings.vram_capacity_gb,
                &mut *rng,
            );
        }
        state.snapshot.critical_logs.extend(update.logs);
        state.snapshot.last_updated = next_timestamp(state.snapshot.last_updated, now_millis());

        if let Some(metrics) = &self.metrics {
            metrics.refresh_total.inc();
            metrics.observe_snapshot(&state.snapshot);
        }
    }

    /// Current snapshot without refreshing
    pub async fn current(&self) -> MetricsSnapshot {
        let state = self.state.read().await;
        let mut snapshot = state.snapshot.clone();
        snapshot.chaos_active = state.chaos.is_active_at(now_millis());
        snapshot
    }

    /// Refresh if due, then return a copy. Always succeeds.
    pub async fn snapshot(&self) -> MetricsSnapshot {
        self.refresh().await;
        self.current().await
    }

    /// Arm the chaos flag, then let the monkey loose.
    ///
    /// The flag is visible to readers before the container host is even
    /// contacted; the resulting log line lands once the run finishes.
    pub async fn trigger_chaos(&self) -> ChaosOutcome {
        self.state
            .write()
            .await
            .chaos
            .arm(now_millis(), self.settings.chaos_reset);
        if let Some(metrics) = &self.metrics {
            metrics.chaos_triggers_total.inc();
        }

        let outcome = self.monkey.unleash().await;
        info!(
            victim = outcome.victim(),
            simulated = outcome.is_simulated(),
            "Chaos Monkey deployed"
        );
        self.record_log(outcome.log_entry(now_millis())).await;
        outcome
    }

    pub async fn record_log(&self, entry: LogEntry) {
        self.state.write().await.snapshot.critical_logs.record(entry);
    }
}

/// Strictly increasing even if the wall clock stalls or steps back
fn next_timestamp(previous: i64, now: i64) -> i64 {
    if now > previous {
        now
    } else {
        previous.saturating_add(1)
    }
}
