//! In-memory connector and peer for exercising a session link without a server
//!
//! [`mock_pair`] returns a [`MockConnector`] to hand to
//! [`SessionLink::with_connector`](crate::SessionLink::with_connector) and a
//! [`MockBackend`] that plays the server: every `open` the link performs shows up
//! as a [`PendingOpen`] that the test accepts or refuses.

#![cfg(any(test, feature = "test-utils"))]

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::transport::{CloseCode, Connector, Transport, TransportEvent};
use crate::{LinkError, Result};

/// Something the client side wrote to a mock transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Text(String),
    Close { code: CloseCode, reason: String },
}

/// Create a connected connector/backend pair.
pub fn mock_pair() -> (MockConnector, MockBackend) {
    let (opens_tx, opens_rx) = mpsc::unbounded_channel();
    (MockConnector { opens: opens_tx }, MockBackend { opens: opens_rx })
}

/// Connector whose opens are answered by a [`MockBackend`].
#[derive(Debug, Clone)]
pub struct MockConnector {
    opens: mpsc::UnboundedSender<PendingOpen>,
}

/// Server side of a [`MockConnector`].
#[derive(Debug)]
pub struct MockBackend {
    opens: mpsc::UnboundedReceiver<PendingOpen>,
}

/// An `open` waiting for the test to accept or refuse it.
#[derive(Debug)]
pub struct PendingOpen {
    endpoint: String,
    reply: oneshot::Sender<Result<MockTransport>>,
}

/// Client half of an accepted mock connection.
#[derive(Debug)]
pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<ClientFrame>,
    /// Sends left before `send_text` starts failing; unlimited when `None`.
    send_budget: Option<usize>,
}

/// Server half of an accepted mock connection.
///
/// Dropping the peer looks like an abnormal close to the client.
#[derive(Debug)]
pub struct MockPeer {
    events: mpsc::UnboundedSender<TransportEvent>,
    frames: mpsc::UnboundedReceiver<ClientFrame>,
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn open(&self, endpoint: &str) -> Result<MockTransport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let pending = PendingOpen { endpoint: endpoint.to_string(), reply: reply_tx };

        if self.opens.send(pending).is_err() {
            return Err(LinkError::connect_failed(endpoint, "mock backend dropped"));
        }

        reply_rx
            .await
            .unwrap_or_else(|_| Err(LinkError::connect_failed(endpoint, "open abandoned by backend")))
    }
}

impl MockBackend {
    /// Wait for the link's next `open`.
    pub async fn next_open(&mut self) -> Option<PendingOpen> {
        self.opens.recv().await
    }

    /// An `open` that is already waiting, if any.
    pub fn try_next_open(&mut self) -> Option<PendingOpen> {
        self.opens.try_recv().ok()
    }
}

impl PendingOpen {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Complete the open and return the server half.
    pub fn accept(self) -> MockPeer {
        self.complete(None)
    }

    /// Complete the open with a transport whose writes fail after `sends` succeed.
    pub fn accept_with_send_budget(self, sends: usize) -> MockPeer {
        self.complete(Some(sends))
    }

    fn complete(self, send_budget: Option<usize>) -> MockPeer {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();

        let transport = MockTransport { inbound: events_rx, outbound: frames_tx, send_budget };
        // The link may have abandoned the open; the peer then just sees no traffic.
        let _ = self.reply.send(Ok(transport));

        MockPeer { events: events_tx, frames: frames_rx }
    }

    /// Fail the open.
    pub fn refuse(self, reason: &str) {
        let error = LinkError::connect_failed(self.endpoint, reason);
        let _ = self.reply.send(Err(error));
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        match self.send_budget.as_mut() {
            Some(0) => return Err(LinkError::transport_failed("mock write failed")),
            Some(left) => *left -= 1,
            None => {}
        }
        self.outbound
            .send(ClientFrame::Text(text))
            .map_err(|_| LinkError::transport_failed("mock peer dropped"))
    }

    async fn next_event(&mut self) -> TransportEvent {
        match self.inbound.recv().await {
            Some(event) => event,
            None => TransportEvent::Closed { code: CloseCode::ABNORMAL, reason: "peer dropped".into() },
        }
    }

    async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        let _ = self.outbound.send(ClientFrame::Close { code, reason: reason.to_string() });
        Ok(())
    }
}

impl MockPeer {
    /// Next frame the client wrote, or `None` once the client side is gone.
    pub async fn next_frame(&mut self) -> Option<ClientFrame> {
        self.frames.recv().await
    }

    /// A frame the client already wrote, if any.
    pub fn try_next_frame(&mut self) -> Option<ClientFrame> {
        self.frames.try_recv().ok()
    }

    /// Next text payload, or `None` if the client closed first.
    pub async fn next_sent(&mut self) -> Option<String> {
        match self.next_frame().await? {
            ClientFrame::Text(text) => Some(text),
            ClientFrame::Close { .. } => None,
        }
    }

    /// Next text payload parsed as JSON.
    pub async fn next_command(&mut self) -> Option<Value> {
        let text = self.next_sent().await?;
        serde_json::from_str(&text).ok()
    }

    /// Skip text payloads until the client closes, returning its close code.
    pub async fn closed_with(&mut self) -> Option<CloseCode> {
        while let Some(frame) = self.next_frame().await {
            if let ClientFrame::Close { code, .. } = frame {
                return Some(code);
            }
        }
        None
    }

    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Text(text.into()));
    }

    pub fn push_json(&self, value: &Value) {
        self.push_text(value.to_string());
    }

    /// Close from the server side with `code`.
    pub fn close(&self, code: CloseCode, reason: &str) {
        let _ = self.events.send(TransportEvent::Closed { code, reason: reason.to_string() });
    }

    /// Fail the connection from the server side.
    pub fn fail(&self, message: &str) {
        let _ = self.events.send(TransportEvent::Failed(message.to_string()));
    }
}

/// Catalog payload with the four exercises the backend ships by default.
pub fn fixture_catalog_json() -> Value {
    serde_json::json!({
        "type": "exercises",
        "exercises": {
            "squats": {
                "name": "Squats",
                "description": "Lower body exercise targeting quads and glutes"
            },
            "pushups": {
                "name": "Push-ups",
                "description": "Upper body exercise for chest, shoulders and triceps"
            },
            "situps": {
                "name": "Sit-ups",
                "description": "Core exercise for abdominal strength"
            },
            "bicep_curls": {
                "name": "Bicep Curls",
                "description": "Arm exercise isolating the biceps"
            }
        }
    })
}

/// A `frame_data` message as the backend sends it.
pub fn frame_data_json(exercise: &str, reps: u32, stage: &str, timestamp: f64) -> Value {
    serde_json::json!({
        "type": "frame_data",
        "exercise_type": exercise,
        "reps": reps,
        "stage": stage,
        "angle": 92.5,
        "pose_detected": true,
        "posture_state": "good",
        "rep_completed": false,
        "timestamp": timestamp
    })
}
