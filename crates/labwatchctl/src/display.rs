//! Terminal rendering for labwatchctl.

use chrono::{Local, TimeZone};
use labwatch_common::{HealthResponse, HostTelemetry, LogEntry, LogLevel, MetricsSnapshot};
use owo_colors::OwoColorize;

const KEY_WIDTH: usize = 16;

fn kv(key: &str, value: impl std::fmt::Display) -> String {
    format!("  {:width$} {}\n", key.dimmed(), value, width = KEY_WIDTH)
}

/// Green below 70, yellow below 90, red above
fn percent(value: f64) -> String {
    let text = format!("{:.1}%", value);
    if value >= 90.0 {
        text.red().bold().to_string()
    } else if value >= 70.0 {
        text.yellow().to_string()
    } else {
        text.green().to_string()
    }
}

fn time_of(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ms.to_string(),
    }
}

fn log_line(entry: &LogEntry) -> String {
    let level = match entry.level {
        LogLevel::Critical => "CRIT ".red().bold().to_string(),
        LogLevel::Error => "ERROR".red().to_string(),
        LogLevel::Warn => "WARN ".yellow().to_string(),
        LogLevel::Info => "INFO ".blue().to_string(),
    };
    format!("    {} {} {}\n", time_of(entry.timestamp).dimmed(), level, entry.text)
}

pub fn render_snapshot(snap: &MetricsSnapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n{}\n", "labwatch".bold()));

    out.push_str(&kv(
        "power",
        format!("{:.0} W  (~${:.2}/day)", snap.ups_watts, snap.daily_cost()),
    ));
    out.push_str(&kv(
        "proxmox",
        format!("cpu {}  ram {}", percent(snap.pve_cpu), percent(snap.pve_ram)),
    ));
    out.push_str(&kv(
        "wan",
        format!("down {:.1} Mbps  up {:.1} Mbps", snap.wan_down, snap.wan_up),
    ));
    out.push_str(&kv("dns blocked", &snap.dns_blocked));
    let logins = if snap.failed_logins > 0 {
        snap.failed_logins.yellow().to_string()
    } else {
        snap.failed_logins.to_string()
    };
    out.push_str(&kv("failed logins", logins));
    out.push_str(&kv("vram", format!("{:.1} GB", snap.vram_usage)));
    out.push_str(&kv("transcodes", snap.active_transcodes));

    let chaos = if snap.chaos_active {
        "ACTIVE".red().bold().to_string()
    } else {
        "calm".green().to_string()
    };
    out.push_str(&kv("chaos", chaos));
    out.push_str(&kv("updated", time_of(snap.last_updated)));

    if snap.critical_logs.is_empty() {
        out.push_str(&kv("logs", "none".dimmed()));
    } else {
        out.push_str(&format!("  {}\n", "logs".dimmed()));
        for entry in snap.critical_logs.iter() {
            out.push_str(&log_line(entry));
        }
    }
    out
}

pub fn render_host(host: &HostTelemetry) -> String {
    let fmt = |v: Option<f64>, unit: &str| match v {
        Some(v) => format!("{:.1}{}", v, unit),
        None => "-".to_string(),
    };
    let mut out = String::new();
    out.push_str(&kv("cpu temp", fmt(host.cpu_temp(), " °C")));
    out.push_str(&kv("load avg", fmt(host.load_avg(), "")));
    out.push_str(&kv("ram usage", fmt(host.ram_usage(), " GB")));
    out
}

pub fn render_health(health: &HealthResponse) -> String {
    let mut out = String::new();
    out.push_str(&kv("daemon", format!("{} v{}", health.status.green(), health.version)));
    out.push_str(&kv("uptime", format!("{}s", health.uptime_seconds)));
    let sources = if health.sources.is_empty() {
        "none (drift only)".yellow().to_string()
    } else {
        health.sources.join(", ")
    };
    out.push_str(&kv("sources", sources));
    out.push_str(&kv("webhook", if health.webhook_configured { "configured" } else { "off" }));
    out.push_str(&kv("ingestion", if health.ingestion_enabled { "enabled" } else { "off" }));
    if let Some(ms) = health.last_push {
        out.push_str(&kv("last push", time_of(ms)));
    }
    out
}
