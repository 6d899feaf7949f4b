//! Shared types for labwatch components.
//!
//! The daemon serializes these onto the wire and the CLI deserializes them,
//! so field names here are the JSON contract the dashboard depends on.

pub mod api;
pub mod chaos;
pub mod logs;
pub mod snapshot;

pub use api::{
    ActionRequest, ApiEnvelope, ControlRequest, ErrorBody, HealthResponse, HostTelemetry,
    IngestAck, MessageAck, SuccessAck,
};
pub use chaos::ChaosToken;
pub use logs::{CriticalLogs, LogEntry, LogLevel, CRITICAL_LOG_CAPACITY};
pub use snapshot::{clamp_percent, format_percent, parse_percent, MetricsSnapshot};

/// Version string shared by daemon and CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default daemon listen port
pub const DEFAULT_PORT: u16 = 8787;

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
