//! Prometheus exposition for labwatchd.
//!
//! Mirrors the snapshot as gauges so the same numbers the dashboard shows
//! can be scraped, and counts what the daemon itself does.

use labwatch_common::MetricsSnapshot;
use prometheus::{
    register_gauge_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, Encoder, GaugeVec, IntCounter, IntCounterVec, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Daemon metrics
#[derive(Clone)]
pub struct LabMetrics {
    pub refresh_total: IntCounter,
    pub source_fetch_total: IntCounterVec,
    pub chaos_triggers_total: IntCounter,
    pub actions_dispatched_total: IntCounterVec,
    pub ingest_total: IntCounterVec,
    pub snapshot_value: GaugeVec,

    registry: Arc<Registry>,
}

impl LabMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let refresh_total = register_int_counter_with_registry!(
            "labwatch_refresh_total",
            "Number of live snapshot refreshes",
            registry
        )?;

        let source_fetch_total = register_int_counter_vec_with_registry!(
            "labwatch_source_fetch_total",
            "Upstream fetches by source and result",
            &["source", "result"],
            registry
        )?;

        let chaos_triggers_total = register_int_counter_with_registry!(
            "labwatch_chaos_triggers_total",
            "Chaos monkey triggers",
            registry
        )?;

        let actions_dispatched_total = register_int_counter_vec_with_registry!(
            "labwatch_actions_dispatched_total",
            "Forwarded actions by kind and result",
            &["kind", "result"],
            registry
        )?;

        let ingest_total = register_int_counter_vec_with_registry!(
            "labwatch_ingest_total",
            "Telemetry pushes by result",
            &["result"],
            registry
        )?;

        let snapshot_value = register_gauge_vec_with_registry!(
            "labwatch_snapshot_value",
            "Current snapshot fields",
            &["field"],
            registry
        )?;

        Ok(Self {
            refresh_total,
            source_fetch_total,
            chaos_triggers_total,
            actions_dispatched_total,
            ingest_total,
            snapshot_value,
            registry: Arc::new(registry),
        })
    }

    pub fn record_fetch(&self, source: &str, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        self.source_fetch_total
            .with_label_values(&[source, result])
            .inc();
    }

    pub fn record_action(&self, kind: &str, result: &str) {
        self.actions_dispatched_total
            .with_label_values(&[kind, result])
            .inc();
    }

    pub fn record_ingest(&self, result: &str) {
        self.ingest_total.with_label_values(&[result]).inc();
    }

    /// Copy the snapshot's numeric fields into gauges
    pub fn observe_snapshot(&self, snap: &MetricsSnapshot) {
        let fields = [
            ("ups_watts", snap.ups_watts),
            ("pve_cpu", snap.pve_cpu),
            ("pve_ram", snap.pve_ram),
            ("wan_down", snap.wan_down),
            ("wan_up", snap.wan_up),
            ("dns_blocked", snap.dns_blocked_pct()),
            ("failed_logins", f64::from(snap.failed_logins)),
            ("vram_usage", snap.vram_usage),
            ("active_transcodes", f64::from(snap.active_transcodes)),
        ];
        for (field, value) in fields {
            self.snapshot_value.with_label_values(&[field]).set(value);
        }
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_contains_recorded_series() {
        let metrics = LabMetrics::new().unwrap();
        metrics.refresh_total.inc();
        metrics.record_fetch("proxmox", false);
        metrics.observe_snapshot(&MetricsSnapshot::with_defaults(0));

        let text = metrics.export().unwrap();
        assert!(text.contains("labwatch_refresh_total 1"));
        assert!(text.lines().any(|l| l.starts_with("labwatch_source_fetch_total{")
            && l.contains(r#"source="proxmox""#)
            && l.contains(r#"result="error""#)
            && l.ends_with(" 1")));
        assert!(text.contains(r#"labwatch_snapshot_value{field="pve_ram"} 72.4"#));
    }

    #[test]
    fn test_independent_registries() {
        // Each instance owns its registry, so tests can build many
        let a = LabMetrics::new().unwrap();
        let b = LabMetrics::new().unwrap();
        a.chaos_triggers_total.inc();
        assert!(b.export().unwrap().contains("labwatch_chaos_triggers_total 0"));
    }
}
