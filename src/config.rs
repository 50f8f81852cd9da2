//! Link configuration
//!
//! A [`LinkConfig`] can be built in code or loaded from YAML:
//!
//! ```yaml
//! endpoint: "wss://coach.example.org/ws/exercise/{exercise}"
//! reconnect:
//!   max_attempts: 3
//!   interval_ms: 2000
//! frame_throttle_ms: 100
//! ```
//!
//! Missing fields take the defaults of the browser client: a local endpoint,
//! five reconnect attempts three seconds apart and a 100 ms frame throttle.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio_tungstenite::tungstenite::http::Uri;

use crate::types::{ExerciseId, ReconnectPolicy};
use crate::{LinkError, Result};

/// Endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8001";

/// Minimum spacing between transmitted frames.
pub const DEFAULT_FRAME_THROTTLE_MS: u64 = 100;

/// Placeholder replaced by [`LinkConfig::for_exercise`].
pub const EXERCISE_PLACEHOLDER: &str = "{exercise}";

/// Configuration for a [`SessionLink`](crate::SessionLink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(default)]
pub struct LinkConfig {
    /// `ws://` or `wss://` URL, optionally containing `{exercise}`.
    pub endpoint: String,
    pub reconnect: ReconnectPolicy,
    pub frame_throttle_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            reconnect: ReconnectPolicy::default(),
            frame_throttle_ms: DEFAULT_FRAME_THROTTLE_MS,
        }
    }
}

impl LinkConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), ..Self::default() }
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_frame_throttle(mut self, window: Duration) -> Self {
        self.frame_throttle_ms = window.as_millis() as u64;
        self
    }

    pub fn frame_throttle(&self) -> Duration {
        Duration::from_millis(self.frame_throttle_ms)
    }

    /// Resolve the `{exercise}` placeholder for the per-exercise endpoint variant.
    ///
    /// Endpoints without a placeholder are returned unchanged.
    pub fn for_exercise(&self, exercise: &ExerciseId) -> Self {
        Self { endpoint: self.endpoint.replace(EXERCISE_PLACEHOLDER, exercise.as_str()), ..self.clone() }
    }

    /// The concrete URL to connect to.
    ///
    /// Fails if the endpoint is invalid or still contains the placeholder.
    pub fn endpoint_url(&self) -> Result<&str> {
        if self.endpoint.contains(EXERCISE_PLACEHOLDER) {
            return Err(LinkError::config_error(
                "endpoint",
                format!("unresolved {EXERCISE_PLACEHOLDER} placeholder in '{}'", self.endpoint),
            ));
        }
        self.validate()?;
        Ok(&self.endpoint)
    }

    /// Check the endpoint and reconnect policy.
    ///
    /// An unresolved placeholder is accepted here; see [`endpoint_url`](Self::endpoint_url).
    pub fn validate(&self) -> Result<()> {
        let candidate = self.endpoint.replace(EXERCISE_PLACEHOLDER, "exercise");
        let uri: Uri = candidate.parse().map_err(|e| {
            LinkError::config_error("endpoint", format!("'{}' is not a URL: {e}", self.endpoint))
        })?;

        match uri.scheme_str() {
            Some("ws") | Some("wss") => {}
            other => {
                return Err(LinkError::config_error(
                    "endpoint",
                    format!("expected ws:// or wss://, got {}", other.unwrap_or("no scheme")),
                ));
            }
        }

        if uri.host().is_none_or(str::is_empty) {
            return Err(LinkError::config_error("endpoint", "missing host"));
        }

        if self.reconnect.max_attempts > 0 && self.reconnect.interval_ms == 0 {
            return Err(LinkError::config_error(
                "reconnect.interval_ms",
                "must be non-zero when reconnecting is enabled",
            ));
        }

        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: LinkConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| LinkError::config_error("yaml", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| LinkError::config_file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }
}
