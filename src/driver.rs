//! Driver spawns and runs the link task

use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::Result;
use crate::machine::{Action, Epoch, LinkMachine};
use crate::transport::{CloseCode, Connector, Transport, TransportEvent};
use crate::types::{LinkStatus, OutboundCommand, SessionMessage};

/// Handler invoked for every decoded inbound message.
pub type MessageHandler = Box<dyn FnMut(SessionMessage) + Send + 'static>;

/// Handler invoked for every published status.
pub type StateHandler = Box<dyn FnMut(&LinkStatus) + Send + 'static>;

/// Requests from the [`SessionLink`](crate::SessionLink) handle.
pub enum LinkCommand {
    Connect,
    Disconnect,
    Send { command: OutboundCommand, requested_at: Instant },
    OnMessage(MessageHandler),
    OnStateChange(StateHandler),
}

/// Result of spawning the driver task
pub struct DriverChannels {
    /// Sender for caller intents
    pub commands: mpsc::UnboundedSender<LinkCommand>,
    /// Receiver for status updates
    pub status: watch::Receiver<LinkStatus>,
    /// Cancellation token for teardown
    pub cancel: CancellationToken,
}

/// Driver spawns the task that owns the machine, the transport and the timer.
///
/// Every caller intent and transport event is processed on this one task, in
/// order, so no state is shared and nothing needs locking.
pub struct Driver;

type Opening<T> = (Epoch, BoxFuture<'static, Result<T>>);

enum Step<T> {
    Command(LinkCommand),
    Opened(Epoch, Result<T>),
    Transport(Epoch, TransportEvent),
    ReconnectDue(u64),
}

struct LinkTask<C: Connector> {
    connector: Arc<C>,
    endpoint: String,
    machine: LinkMachine,
    transport: Option<(Epoch, C::Transport)>,
    opening: Option<Opening<C::Transport>>,
    reconnect_at: Option<(u64, Instant)>,
    on_message: Option<MessageHandler>,
    on_state: Option<StateHandler>,
    status_tx: watch::Sender<LinkStatus>,
}

impl Driver {
    /// Spawn the link task for `endpoint`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<C>(connector: C, endpoint: String, machine: LinkMachine) -> DriverChannels
    where
        C: Connector,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(machine.status().clone());
        let cancel = CancellationToken::new();

        let task = LinkTask {
            connector: Arc::new(connector),
            endpoint,
            machine,
            transport: None,
            opening: None,
            reconnect_at: None,
            on_message: None,
            on_state: None,
            status_tx,
        };

        let cancel_task = cancel.clone();
        tokio::spawn(async move {
            task.run(command_rx, cancel_task).await;
        });

        DriverChannels { commands: command_tx, status: status_rx, cancel }
    }
}

impl<C: Connector> LinkTask<C> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<LinkCommand>,
        cancel: CancellationToken,
    ) {
        info!("Link task started for {}", self.endpoint);

        loop {
            let step = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Link task cancelled");
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => Step::Command(command),
                    None => {
                        debug!("Link handle dropped");
                        break;
                    }
                },
                (epoch, outcome) = poll_opening(&mut self.opening), if self.opening.is_some() => {
                    Step::Opened(epoch, outcome)
                }
                (epoch, event) = next_transport_event(&mut self.transport), if self.transport.is_some() => {
                    Step::Transport(epoch, event)
                }
                token = reconnect_due(self.reconnect_at), if self.reconnect_at.is_some() => {
                    Step::ReconnectDue(token)
                }
            };

            let actions = self.step(step).await;
            self.execute(actions).await;
        }

        // Same teardown order as disconnect(): timer first, then transport.
        let actions = self.machine.disconnect();
        self.execute(actions).await;
        info!("Link task ended for {}", self.endpoint);
    }

    async fn step(&mut self, step: Step<C::Transport>) -> Vec<Action> {
        match step {
            Step::Command(LinkCommand::Connect) => self.machine.connect(),
            Step::Command(LinkCommand::Disconnect) => self.machine.disconnect(),
            Step::Command(LinkCommand::Send { command, requested_at }) => {
                self.machine.send(command, requested_at)
            }
            Step::Command(LinkCommand::OnMessage(handler)) => {
                self.on_message = Some(handler);
                Vec::new()
            }
            Step::Command(LinkCommand::OnStateChange(handler)) => {
                self.on_state = Some(handler);
                Vec::new()
            }
            Step::Opened(epoch, Ok(mut transport)) => {
                self.opening = None;
                if !self.machine.is_current(epoch) {
                    debug!("Closing transport {} opened after it was abandoned", epoch);
                    let _ = transport.close(CloseCode::NORMAL, "abandoned").await;
                    return Vec::new();
                }
                self.transport = Some((epoch, transport));
                self.machine.opened(epoch)
            }
            Step::Opened(epoch, Err(e)) => {
                self.opening = None;
                self.machine.failed(epoch, &e.to_string())
            }
            Step::Transport(epoch, TransportEvent::Text(text)) => self.machine.received(epoch, &text),
            Step::Transport(epoch, TransportEvent::Closed { code, reason }) => {
                self.transport = None;
                self.machine.closed(epoch, code, &reason)
            }
            Step::Transport(epoch, TransportEvent::Failed(message)) => {
                self.transport = None;
                self.machine.failed(epoch, &message)
            }
            Step::ReconnectDue(token) => {
                self.reconnect_at = None;
                self.machine.reconnect_due(token)
            }
        }
    }

    async fn execute(&mut self, actions: Vec<Action>) {
        let mut pending: VecDeque<Action> = actions.into();

        while let Some(action) = pending.pop_front() {
            match action {
                Action::Open { epoch } => {
                    let connector = Arc::clone(&self.connector);
                    let endpoint = self.endpoint.clone();
                    self.opening =
                        Some((epoch, Box::pin(async move { connector.open(&endpoint).await })));
                }
                Action::Transmit { command, text } => {
                    let Some((epoch, transport)) = self.transport.as_mut() else {
                        warn!("No open transport, dropping {}", command.kind());
                        continue;
                    };
                    let epoch = *epoch;
                    trace!("Transmitting {} on transport {}", command.kind(), epoch);
                    let sent = transport.send_text(text).await;
                    if let Err(e) = sent {
                        error!("Send failed on transport {}: {}", epoch, e);
                        self.transport = None;
                        // The rest of this batch was produced for the transport that just
                        // failed: keep its unsent commands, drop its status updates.
                        let unsent = std::iter::once(command)
                            .chain(pending.drain(..).filter_map(|action| match action {
                                Action::Transmit { command, .. } => Some(command),
                                _ => None,
                            }))
                            .collect();
                        pending.extend(self.machine.send_failed(epoch, unsent, &e.to_string()));
                    }
                }
                Action::Close { code, reason } => {
                    self.opening = None;
                    if let Some((epoch, mut transport)) = self.transport.take() {
                        debug!("Closing transport {} ({})", epoch, code);
                        if let Err(e) = transport.close(code, &reason).await {
                            debug!("Close of transport {} failed: {}", epoch, e);
                        }
                    }
                }
                Action::ArmReconnect { token, after } => {
                    self.reconnect_at = Some((token, Instant::now() + after));
                }
                Action::CancelReconnect => {
                    self.reconnect_at = None;
                }
                Action::Dispatch(message) => match self.on_message.as_mut() {
                    Some(handler) => handler(message),
                    None => debug!("No message handler registered, dropping {}", message.kind()),
                },
                Action::Publish(status) => {
                    if let Some(handler) = self.on_state.as_mut() {
                        handler(&status);
                    }
                    self.status_tx.send_replace(status);
                }
            }
        }
    }
}

async fn poll_opening<T>(opening: &mut Option<Opening<T>>) -> (Epoch, Result<T>) {
    match opening {
        Some((epoch, future)) => (*epoch, future.as_mut().await),
        None => std::future::pending().await,
    }
}

async fn next_transport_event<T: Transport>(
    transport: &mut Option<(Epoch, T)>,
) -> (Epoch, TransportEvent) {
    match transport {
        Some((epoch, transport)) => (*epoch, transport.next_event().await),
        None => std::future::pending().await,
    }
}

async fn reconnect_due(at: Option<(u64, Instant)>) -> u64 {
    match at {
        Some((token, deadline)) => {
            sleep_until(deadline).await;
            token
        }
        None => std::future::pending().await,
    }
}
