//! Host telemetry pushed by the homelab agent.

use labwatch_common::{now_millis, HostTelemetry};
use tokio::sync::RwLock;

struct Received {
    telemetry: HostTelemetry,
    received_at: i64,
}

/// Last pushed telemetry; empty until the agent's first push
#[derive(Default)]
pub struct TelemetryStore {
    latest: RwLock<Option<Received>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn store(&self, telemetry: HostTelemetry) {
        *self.latest.write().await = Some(Received {
            telemetry,
            received_at: now_millis(),
        });
    }

    /// Pushed values overlaid on the fallbacks
    pub async fn current(&self) -> HostTelemetry {
        match &*self.latest.read().await {
            Some(received) => received.telemetry.overlaid_on_fallback(),
            None => HostTelemetry::fallback(),
        }
    }

    /// Exactly what the agent last sent
    pub async fn raw(&self) -> Option<HostTelemetry> {
        self.latest.read().await.as_ref().map(|r| r.telemetry.clone())
    }

    pub async fn last_received_at(&self) -> Option<i64> {
        self.latest.read().await.as_ref().map(|r| r.received_at)
    }
}
