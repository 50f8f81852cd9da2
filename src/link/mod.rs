//! The session link handle

use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::LinkConfig;
use crate::driver::{Driver, LinkCommand};
use crate::machine::LinkMachine;
use crate::transport::Connector;
use crate::transports::WebSocketConnector;
use crate::types::{ConnectionState, ExerciseId, LinkStatus, OutboundCommand, SessionMessage};
use crate::{LinkError, Result};

#[cfg(test)]
mod tests;

/// Client side of one exercise session channel.
///
/// Owns exactly one transport and one reconnect timer, both held by a
/// background task spawned on construction. The operations below return
/// immediately; their effects are applied by that task in call order.
/// Failures are never returned from them: they show up as
/// [`ConnectionState`] changes.
///
/// Dropping the link tears the task down the same way [`disconnect`](Self::disconnect)
/// does.
pub struct SessionLink {
    config: LinkConfig,
    commands: mpsc::UnboundedSender<LinkCommand>,
    status: watch::Receiver<LinkStatus>,
    cancel: CancellationToken,
}

impl SessionLink {
    /// Create a link to a WebSocket endpoint.
    ///
    /// Must be called from within a tokio runtime. Fails only on invalid configuration.
    pub fn new(config: LinkConfig) -> Result<Self> {
        Self::with_connector(config, WebSocketConnector)
    }

    /// Create a link that opens its transports through `connector`.
    pub fn with_connector<C: Connector>(config: LinkConfig, connector: C) -> Result<Self> {
        let endpoint = config.endpoint_url()?.to_string();
        let machine = LinkMachine::new(config.reconnect, config.frame_throttle());

        let channels = Driver::spawn(connector, endpoint, machine);
        info!("Session link created for {}", config.endpoint);

        Ok(Self {
            config,
            commands: channels.commands,
            status: channels.status,
            cancel: channels.cancel,
        })
    }

    /// Open the transport. No-op while connecting or connected.
    pub fn connect(&self) {
        self.submit(LinkCommand::Connect);
    }

    /// Cancel any pending reconnect, close the transport with a normal
    /// closure and reset the attempt counter.
    pub fn disconnect(&self) {
        self.submit(LinkCommand::Disconnect);
    }

    /// Send a command, or queue it until the next open.
    ///
    /// Frames inside the throttle window are dropped, never queued.
    pub fn send(&self, command: OutboundCommand) {
        self.submit(LinkCommand::Send { command, requested_at: Instant::now() });
    }

    /// Register the handler for decoded inbound messages, replacing any previous one.
    ///
    /// The handler runs on the link task; keep it short.
    pub fn on_message<F>(&self, handler: F)
    where
        F: FnMut(SessionMessage) + Send + 'static,
    {
        self.submit(LinkCommand::OnMessage(Box::new(handler)));
    }

    /// Register the handler called on every status change, replacing any previous one.
    pub fn on_state_change<F>(&self, handler: F)
    where
        F: FnMut(&LinkStatus) + Send + 'static,
    {
        self.submit(LinkCommand::OnStateChange(Box::new(handler)));
    }

    pub fn request_exercises(&self) {
        self.send(OutboundCommand::GetExercises);
    }

    pub fn start_session(&self, exercise: impl Into<ExerciseId>) {
        self.send(OutboundCommand::start_session(exercise));
    }

    /// Send one JPEG frame for analysis, subject to the frame throttle.
    pub fn process_frame(&self, exercise: impl Into<ExerciseId>, jpeg: Vec<u8>) {
        self.send(OutboundCommand::process_frame(exercise, jpeg));
    }

    pub fn reset_counter(&self) {
        self.send(OutboundCommand::ResetCounter);
    }

    pub fn ping(&self) {
        self.send(OutboundCommand::Ping);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Current status, including last error and reconnect progress.
    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    /// Status updates, starting with the current one.
    ///
    /// Intermediate values may be skipped if the consumer falls behind; use
    /// [`on_state_change`](Self::on_state_change) to see every transition.
    pub fn state_changes(&self) -> impl Stream<Item = LinkStatus> + 'static {
        WatchStream::new(self.status.clone())
    }

    /// Wait until the status satisfies `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<LinkStatus>
    where
        F: FnMut(&LinkStatus) -> bool,
    {
        let mut status = self.status.clone();
        let current = status.wait_for(|s| predicate(s)).await.map_err(|_| LinkError::LinkClosed)?;
        Ok(current.clone())
    }

    /// Wait until the link reaches `state`.
    pub async fn wait_for_state(&self, state: ConnectionState) -> Result<LinkStatus> {
        self.wait_for(|status| status.state == state).await
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn submit(&self, command: LinkCommand) {
        if self.commands.send(command).is_err() {
            debug!("Link task has ended, dropping request");
        }
    }
}

impl Drop for SessionLink {
    fn drop(&mut self) {
        debug!("Dropping session link");
        self.cancel.cancel();
    }
}
