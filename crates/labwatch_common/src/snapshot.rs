//! The aggregated metrics snapshot served to the dashboard.

use serde::{Deserialize, Serialize};

use crate::logs::CriticalLogs;

/// Cached aggregate of homelab metrics.
///
/// Every field is always populated: values from unreachable sources are
/// replaced by drifted stand-ins rather than left out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    // Power
    pub ups_watts: f64,
    pub cost_per_kwh: f64,

    // Hypervisor, percent
    pub pve_cpu: f64,
    pub pve_ram: f64,

    // Network, Mbps
    pub wan_down: f64,
    pub wan_up: f64,
    /// Percentage string with one decimal, e.g. "18.4%"
    pub dns_blocked: String,
    pub failed_logins: u32,

    // GPU, GB
    pub vram_usage: f64,

    // Media
    pub active_transcodes: u32,

    pub critical_logs: CriticalLogs,

    /// Milliseconds since the Unix epoch
    pub last_updated: i64,
    pub chaos_active: bool,
}

impl MetricsSnapshot {
    /// Startup values, used until the first refresh replaces them.
    pub fn with_defaults(now_ms: i64) -> Self {
        Self {
            ups_watts: 450.0,
            cost_per_kwh: 0.14,
            pve_cpu: 45.0,
            pve_ram: 72.4,
            wan_down: 854.2,
            wan_up: 122.1,
            dns_blocked: format_percent(18.4),
            failed_logins: 3,
            vram_usage: 14.2,
            active_transcodes: 2,
            critical_logs: CriticalLogs::new(),
            last_updated: now_ms,
            chaos_active: false,
        }
    }

    /// Numeric value of `dns_blocked`, 0.0 if it is unparseable
    pub fn dns_blocked_pct(&self) -> f64 {
        parse_percent(&self.dns_blocked).unwrap_or(0.0)
    }

    /// Estimated power cost per day at the current draw
    pub fn daily_cost(&self) -> f64 {
        self.ups_watts / 1000.0 * 24.0 * self.cost_per_kwh
    }
}

/// Clamp to [0, 100]; NaN becomes 0.
pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Format a percentage the way the dashboard expects it ("18.4%").
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", clamp_percent(value))
}

/// Parse "18.4%" or "18.4" back into a number.
pub fn parse_percent(text: &str) -> Option<f64> {
    text.trim().trim_end_matches('%').trim().parse::<f64>().ok()
}
