//! Sans-io connection state machine.
//!
//! [`LinkMachine`] owns every piece of mutable link state (lifecycle state, retry
//! counter, outbound queue, frame throttle) and turns caller intents and transport
//! events into a list of [`Action`]s. It performs no I/O and reads no clock; the
//! [`Driver`](crate::driver::Driver) executes the actions and feeds events back in.
//!
//! Transitions:
//!
//! | From | Event | To |
//! |---|---|---|
//! | Disconnected / Error | `connect()` | Connecting |
//! | Connecting | open | Connected (flush queue, reset attempts, send `get_exercises`) |
//! | Connecting | failure, manual connect | Error |
//! | Connecting | failure, during reconnect | as an abnormal close |
//! | Connecting / Connected | close, normal | Disconnected |
//! | Connecting / Connected | close, abnormal, attempts left | Disconnected + reconnect armed, then Connecting |
//! | Connecting / Connected | close, abnormal, exhausted | Disconnected |
//! | Connected | failure | Error |
//! | any | `disconnect()` | Disconnected (cancel timer, then close) |
//!
//! Every transport gets an epoch. Events carrying a stale epoch (a transport we
//! already closed) are discarded, and reconnect timers carry a token so a timer
//! that fires after being cancelled does nothing.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::codec;
use crate::throttle::FrameThrottle;
use crate::transport::CloseCode;
use crate::types::{ConnectionState, LinkStatus, OutboundCommand, ReconnectPolicy, SessionMessage};

/// Transport generation counter.
pub type Epoch = u64;

/// Close reason sent on `disconnect()`.
pub const MANUAL_DISCONNECT_REASON: &str = "Manual disconnect";

/// Side effect requested by the machine, executed in order by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Start opening a transport for this epoch.
    Open { epoch: Epoch },
    /// Send the encoded `command` on the current transport.
    Transmit { command: OutboundCommand, text: String },
    /// Close the current transport (or abandon the in-flight open).
    Close { code: CloseCode, reason: String },
    /// Fire `reconnect_due(token)` after the delay.
    ArmReconnect { token: u64, after: Duration },
    CancelReconnect,
    /// Hand a decoded message to the registered handler.
    Dispatch(SessionMessage),
    /// Publish a new status.
    Publish(LinkStatus),
}

/// The link state machine.
#[derive(Debug)]
pub struct LinkMachine {
    policy: ReconnectPolicy,
    throttle: FrameThrottle,
    status: LinkStatus,
    queue: VecDeque<OutboundCommand>,
    epoch: Epoch,
    /// A transport exists (opening or open) for `epoch`.
    live: bool,
    /// The transport for `epoch` was opened by the reconnect timer, not by `connect()`.
    reconnecting: bool,
    reconnect_token: Option<u64>,
    next_token: u64,
}

impl LinkMachine {
    pub fn new(policy: ReconnectPolicy, frame_throttle: Duration) -> Self {
        Self {
            policy,
            throttle: FrameThrottle::new(frame_throttle),
            status: LinkStatus::default(),
            queue: VecDeque::new(),
            epoch: 0,
            live: false,
            reconnecting: false,
            reconnect_token: None,
            next_token: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.status.state
    }

    pub fn status(&self) -> &LinkStatus {
        &self.status
    }

    /// Commands waiting for the next successful open.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Whether `epoch` is the transport the machine currently expects events from.
    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.live && epoch == self.epoch
    }

    /// Caller asked to connect. No-op while connecting or connected.
    pub fn connect(&mut self) -> Vec<Action> {
        match self.status.state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                debug!("connect() ignored while {}", self.status.state);
                return Vec::new();
            }
            ConnectionState::Disconnected | ConnectionState::Error => {}
        }

        let mut actions = Vec::new();
        self.cancel_reconnect(&mut actions);
        self.reconnecting = false;
        self.open_transport(&mut actions);
        actions
    }

    /// Caller asked to disconnect. Cancels the timer before closing the transport.
    pub fn disconnect(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        self.cancel_reconnect(&mut actions);

        if self.live {
            self.live = false;
            actions.push(Action::Close {
                code: CloseCode::NORMAL,
                reason: MANUAL_DISCONNECT_REASON.to_string(),
            });
        }

        info!("Disconnected by caller");
        self.reconnecting = false;
        self.throttle.reset();
        self.status.state = ConnectionState::Disconnected;
        self.status.attempts_made = 0;
        self.publish(&mut actions);
        actions
    }

    /// Caller asked to send `command`, requested at `now`.
    pub fn send(&mut self, command: OutboundCommand, now: Instant) -> Vec<Action> {
        if command.is_frame() && !self.throttle.admit(now) {
            trace!("Frame dropped by {:?} throttle", self.throttle.window());
            return Vec::new();
        }

        if self.status.state == ConnectionState::Connected && self.live {
            return self.transmit(&command).into_iter().collect();
        }

        debug!(
            "Queueing {} while {} ({} queued)",
            command.kind(),
            self.status.state,
            self.queue.len() + 1
        );
        self.queue.push_back(command);
        Vec::new()
    }

    /// The transport for `epoch` finished opening.
    pub fn opened(&mut self, epoch: Epoch) -> Vec<Action> {
        if !self.is_current(epoch) || self.status.state != ConnectionState::Connecting {
            debug!("Ignoring open of stale transport {}", epoch);
            return Vec::new();
        }

        let mut actions = Vec::new();
        let queued = self.queue.len();
        while let Some(command) = self.queue.pop_front() {
            actions.extend(self.transmit(&command));
        }

        info!("Connected (transport {}, flushed {} queued commands)", epoch, queued);
        self.reconnecting = false;
        self.status.state = ConnectionState::Connected;
        self.status.attempts_made = 0;
        self.status.last_error = None;
        self.publish(&mut actions);

        actions.extend(self.transmit(&OutboundCommand::GetExercises));
        actions
    }

    /// The transport for `epoch` closed.
    pub fn closed(&mut self, epoch: Epoch, code: CloseCode, reason: &str) -> Vec<Action> {
        if !self.is_current(epoch) {
            debug!("Ignoring close {} of stale transport {}", code, epoch);
            return Vec::new();
        }
        self.live = false;
        self.reconnecting = false;

        let mut actions = Vec::new();
        if code.is_normal() {
            info!("Connection closed normally: {}", reason);
            self.status.state = ConnectionState::Disconnected;
            self.publish(&mut actions);
        } else {
            warn!("Connection closed abnormally ({}): {}", code, reason);
            self.connection_lost(&mut actions);
        }
        actions
    }

    /// The transport for `epoch` failed to open, or failed while open.
    pub fn failed(&mut self, epoch: Epoch, message: &str) -> Vec<Action> {
        if !self.is_current(epoch) {
            debug!("Ignoring failure of stale transport {}: {}", epoch, message);
            return Vec::new();
        }
        self.live = false;

        error!("Transport error: {}", message);
        let mut actions = Vec::new();
        let retrying = self.status.state == ConnectionState::Connecting && self.reconnecting;
        self.reconnecting = false;

        self.status.state = ConnectionState::Error;
        self.status.last_error = Some(message.to_string());
        self.publish(&mut actions);

        if retrying {
            self.connection_lost(&mut actions);
        }
        actions
    }

    /// Sending on `epoch` failed. `unsent` holds the failed command followed by
    /// the ones still waiting behind it; they go back to the front of the queue
    /// and are flushed again on the next successful open.
    pub fn send_failed(
        &mut self,
        epoch: Epoch,
        unsent: Vec<OutboundCommand>,
        message: &str,
    ) -> Vec<Action> {
        if !self.is_current(epoch) {
            debug!("Ignoring send failure of stale transport {}: {}", epoch, message);
            return Vec::new();
        }

        // get_exercises is sent on every open anyway.
        let requeued: Vec<_> =
            unsent.into_iter().filter(|c| *c != OutboundCommand::GetExercises).collect();
        if !requeued.is_empty() {
            debug!("Requeueing {} unsent commands", requeued.len());
        }
        for command in requeued.into_iter().rev() {
            self.queue.push_front(command);
        }

        self.failed(epoch, message)
    }

    /// A text payload arrived on `epoch`.
    pub fn received(&mut self, epoch: Epoch, text: &str) -> Vec<Action> {
        if !self.is_current(epoch) {
            return Vec::new();
        }

        match codec::decode_inbound(text) {
            Ok(Some(message)) => {
                trace!("Received {}", message.kind());
                vec![Action::Dispatch(message)]
            }
            Ok(None) => {
                debug!("Ignoring message with unknown type");
                Vec::new()
            }
            Err(e) => {
                warn!("Dropping undecodable message: {}", e);
                Vec::new()
            }
        }
    }

    /// The reconnect timer identified by `token` fired.
    pub fn reconnect_due(&mut self, token: u64) -> Vec<Action> {
        if self.reconnect_token != Some(token) {
            debug!("Ignoring stale reconnect timer {}", token);
            return Vec::new();
        }
        self.reconnect_token = None;
        self.status.reconnect_pending = false;
        self.reconnecting = true;

        info!("Reconnect attempt {}/{}", self.status.attempts_made, self.policy.max_attempts);
        let mut actions = Vec::new();
        self.open_transport(&mut actions);
        actions
    }

    fn open_transport(&mut self, actions: &mut Vec<Action>) {
        self.epoch += 1;
        self.live = true;
        self.status.state = ConnectionState::Connecting;
        self.status.last_error = None;
        actions.push(Action::Open { epoch: self.epoch });
        self.publish(actions);
    }

    /// Abnormal loss of the connection: schedule a bounded retry or give up.
    fn connection_lost(&mut self, actions: &mut Vec<Action>) {
        self.status.state = ConnectionState::Disconnected;

        if self.policy.allows(self.status.attempts_made) {
            self.status.attempts_made += 1;
            self.next_token += 1;
            self.reconnect_token = Some(self.next_token);
            self.status.reconnect_pending = true;
            debug!(
                "Scheduling reconnect {}/{} in {:?}",
                self.status.attempts_made,
                self.policy.max_attempts,
                self.policy.interval()
            );
            actions
                .push(Action::ArmReconnect { token: self.next_token, after: self.policy.interval() });
        } else {
            warn!("Giving up after {} reconnect attempts", self.status.attempts_made);
        }

        self.publish(actions);
    }

    fn cancel_reconnect(&mut self, actions: &mut Vec<Action>) {
        if self.reconnect_token.take().is_some() {
            self.status.reconnect_pending = false;
            actions.push(Action::CancelReconnect);
        }
    }

    fn transmit(&self, command: &OutboundCommand) -> Option<Action> {
        match codec::encode_command(command) {
            Ok(text) => Some(Action::Transmit { command: command.clone(), text }),
            Err(e) => {
                error!("Failed to encode {}: {}", command.kind(), e);
                None
            }
        }
    }

    fn publish(&self, actions: &mut Vec<Action>) {
        actions.push(Action::Publish(self.status.clone()));
    }
}
