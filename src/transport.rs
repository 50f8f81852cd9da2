//! Transport trait for the message channel under a session link

use std::fmt;

use crate::Result;

/// WebSocket-style close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    pub const NORMAL: CloseCode = CloseCode(1000);
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    pub const NO_STATUS: CloseCode = CloseCode(1005);
    pub const ABNORMAL: CloseCode = CloseCode(1006);

    /// Only a normal closure suppresses automatic reconnection.
    pub fn is_normal(self) -> bool {
        self == CloseCode::NORMAL
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something that happened on an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text payload arrived.
    Text(String),

    /// The connection closed. Dropped connections report `CloseCode::ABNORMAL`.
    Closed { code: CloseCode, reason: String },

    /// The connection failed for a reason other than closing.
    Failed(String),
}

/// Opens transports to an endpoint.
///
/// The driver holds at most one transport per link; `open` is only called
/// again after the previous transport closed, failed or was closed by us.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn open(&self, endpoint: &str) -> Result<Self::Transport>;
}

/// Full-duplex, message-oriented connection.
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    /// Transmit one text payload.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Wait for the next event.
    ///
    /// Must be cancel-safe: the driver polls it inside `select!` and drops the
    /// future whenever another branch wins.
    ///
    /// After returning `Closed` or `Failed` the transport is discarded.
    async fn next_event(&mut self) -> TransportEvent;

    /// Close the connection with the given code.
    async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()>;
}
