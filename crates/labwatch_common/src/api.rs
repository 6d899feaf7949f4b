//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `{"success": true, "data": ...}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// `{"error": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// `{"success": true}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessAck {
    pub success: bool,
}

impl SuccessAck {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// `{"success": true, "message": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageAck {
    pub success: bool,
    pub message: String,
}

impl MessageAck {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Echo returned after a telemetry push
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestAck {
    pub success: bool,
    pub telemetry: Value,
}

/// Body of `POST /api/god-tier-metrics`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub action: String,
    /// Required by `ha_toggle`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

/// Body of `POST /api/docker-control`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
}

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Upstream sources with complete configuration
    pub sources: Vec<String>,
    pub webhook_configured: bool,
    pub ingestion_enabled: bool,
    /// Millis since epoch of the last accepted telemetry push
    #[serde(default)]
    pub last_push: Option<i64>,
}

/// Host telemetry pushed by the homelab agent.
///
/// The agent may send any JSON object; readers always see at least the
/// three dial values, falling back to fixed numbers until a push arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostTelemetry(Map<String, Value>);

impl HostTelemetry {
    pub const FALLBACK_CPU_TEMP: f64 = 44.5;
    pub const FALLBACK_LOAD_AVG: f64 = 1.2;
    pub const FALLBACK_RAM_USAGE: f64 = 16.4;

    pub fn fallback() -> Self {
        let mut map = Map::new();
        map.insert("cpuTemp".to_string(), Value::from(Self::FALLBACK_CPU_TEMP));
        map.insert("loadAvg".to_string(), Value::from(Self::FALLBACK_LOAD_AVG));
        map.insert("ramUsage".to_string(), Value::from(Self::FALLBACK_RAM_USAGE));
        Self(map)
    }

    /// Accepts only JSON objects.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Fallback fields overlaid with the pushed ones
    pub fn overlaid_on_fallback(&self) -> Self {
        let mut merged = Self::fallback();
        for (key, value) in &self.0 {
            merged.0.insert(key.clone(), value.clone());
        }
        merged
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn cpu_temp(&self) -> Option<f64> {
        self.get_f64("cpuTemp")
    }

    pub fn load_avg(&self) -> Option<f64> {
        self.get_f64("loadAvg")
    }

    pub fn ram_usage(&self) -> Option<f64> {
        self.get_f64("ramUsage")
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}
