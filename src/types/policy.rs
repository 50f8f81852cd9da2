//! Reconnection policy

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded, fixed-interval reconnection policy.
///
/// Reconnection is attempted after abnormal closures only. Once `max_attempts`
/// consecutive attempts have been spent the link stays disconnected until the
/// caller connects again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(default)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl ReconnectPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    pub const DEFAULT_INTERVAL_MS: u64 = 3000;

    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self { max_attempts, interval_ms: interval.as_millis() as u64 }
    }

    /// Policy that never reconnects automatically.
    pub fn disabled() -> Self {
        Self { max_attempts: 0, ..Self::default() }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    pub fn allows(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_attempts: Self::DEFAULT_MAX_ATTEMPTS, interval_ms: Self::DEFAULT_INTERVAL_MS }
    }
}
