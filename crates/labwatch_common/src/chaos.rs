//! Expiring chaos flag.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A boolean that turns itself off.
///
/// Arming stores an absolute expiry; readers compare against their own
/// clock, so there is no reset task to cancel when a second trigger lands
/// inside the window. Re-arming simply moves the expiry forward.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChaosToken {
    /// Milliseconds since the Unix epoch
    expires_at: Option<i64>,
}

impl ChaosToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, now_ms: i64, duration: Duration) {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.expires_at = Some(now_ms.saturating_add(millis));
    }

    pub fn is_active_at(&self, now_ms: i64) -> bool {
        matches!(self.expires_at, Some(expiry) if now_ms < expiry)
    }
}
