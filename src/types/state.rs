//! Connection lifecycle state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a session link.
///
/// Exactly one value holds at a time. `Error` is never left automatically;
/// the caller has to `connect()` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    /// Label shown by host UIs.
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Error => "Error",
        }
    }

    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Observable status of a link, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct LinkStatus {
    pub state: ConnectionState,

    /// Message recorded by the last transport failure, cleared on `connect()`.
    pub last_error: Option<String>,

    /// Automatic reconnect attempts since the last successful open.
    pub attempts_made: u32,

    /// A reconnect timer is armed.
    pub reconnect_pending: bool,
}
