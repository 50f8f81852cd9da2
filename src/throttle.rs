//! Frame send throttling

use std::time::Duration;
use tokio::time::Instant;

/// Strict wall-clock gate for outbound frames.
///
/// Admits at most one frame per `window`, keyed on the time the caller asked to
/// send. Frames arriving inside the window are dropped outright; unlike a
/// latest-wins stream throttle nothing is held back for later emission, since the
/// caller produces a fresh frame on its next camera tick anyway.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    window: Duration,
    last_admitted: Option<Instant>,
}

impl FrameThrottle {
    pub fn new(window: Duration) -> Self {
        Self { window, last_admitted: None }
    }

    /// Try to admit a frame requested at `now`.
    pub fn admit(&mut self, now: Instant) -> bool {
        match self.last_admitted {
            Some(previous) if now.saturating_duration_since(previous) < self.window => false,
            _ => {
                self.last_admitted = Some(now);
                true
            }
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Forget the last admitted frame so the next one passes immediately.
    pub fn reset(&mut self) {
        self.last_admitted = None;
    }
}
