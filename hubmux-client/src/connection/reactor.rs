//! Connection reactor
//!
//! A single task owns the transport, the session registry, and every
//! timer. It reacts to handle commands, link events, the reconnect delay
//! and the earliest re-render deadline, so no state is ever shared between
//! tasks. Replay flush notices come back through the command queue, which
//! keeps them ordered with input queued before and after them.

use std::sync::Arc;


use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use hubmux_protocol::{decode_payload, decode_server_message, encode_client_message};
use hubmux_protocol::{ClientMessage, ServerMessage};
use hubmux_utils::{HubmuxError, Result};

use super::backoff::ReconnectPolicy;
use super::client::{Command, ConnectionConfig};
use super::handler::{ConnectionStatus, EventHandler, HubEvent};
use super::transport::{self, Link, LinkEvent};
use crate::escape::{filter_input, normalize};
use crate::session::{FlushNotifier, SessionRegistry};

pub(crate) struct Reactor {
    url: String,
    connect_timeout: std::time::Duration,
    policy: ReconnectPolicy,
    handler: Box<dyn EventHandler>,
    status: watch::Sender<ConnectionStatus>,
    registry: SessionRegistry,
    link: Option<Link>,
    pending_connect: Option<JoinHandle<Result<Link>>>,
    reconnect_at: Option<Instant>,
    /// Set by disconnect; suppresses auto-reconnect on the next close
    intentional_close: bool,
}

impl Reactor {
    pub(crate) fn new(
        config: ConnectionConfig,
        handler: Box<dyn EventHandler>,
        status: watch::Sender<ConnectionStatus>,
        commands: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        // Weak, so pending flush callbacks do not keep the reactor alive
        let notify: FlushNotifier = Arc::new(move |notice| {
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(Command::ReplayFlushed(notice));
            }
        });
        Self {
            url: config.url,
            connect_timeout: config.connect_timeout,
            policy: config.reconnect,
            handler,
            status,
            registry: SessionRegistry::new(config.rerender_fallback, notify),
            link: None,
            pending_connect: None,
            reconnect_at: None,
            intentional_close: false,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!(url = %self.url, "Connection reactor started");

        loop {
            let rerender_at = self.registry.next_deadline();

            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.on_command(cmd),
                },

                result = wait_connect(&mut self.pending_connect) => {
                    self.on_connect_result(result);
                }

                event = next_link_event(&mut self.link) => {
                    self.on_link_event(event);
                }

                _ = sleep_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.start_connect();
                }

                _ = sleep_until(rerender_at) => {
                    self.registry.fire_expired(Instant::now());
                }
            }
        }

        self.disconnect();
        self.set_status(ConnectionStatus::Idle);
        debug!("Connection reactor stopped");
    }

    fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect => {
                self.reconnect_at = None;
                self.start_connect();
            }
            Command::Disconnect => self.disconnect(),
            Command::Shutdown => self.disconnect(),
            Command::Subscribe(agent_id) => {
                if !self.registry.insert(&agent_id) {
                    debug!(agent_id = %agent_id, "Already subscribed, re-requesting replay");
                }
                self.send(ClientMessage::Subscribe { agent_id });
            }
            Command::Unsubscribe(agent_id) => {
                self.registry.remove(&agent_id);
                self.send(ClientMessage::Unsubscribe { agent_id });
            }
            Command::Bind(agent_id, sink) => self.registry.bind(&agent_id, sink),
            Command::Unbind(agent_id) => {
                self.registry.unbind(&agent_id);
            }
            Command::Input { agent_id, data } => self.on_input(agent_id, data),
            Command::Resize {
                agent_id,
                cols,
                rows,
            } => {
                self.registry
                    .begin_resize(&agent_id, cols, rows, Instant::now());
                self.send(ClientMessage::Resize {
                    agent_id,
                    cols,
                    rows,
                });
            }
            Command::ReplayFlushed(notice) => {
                self.registry.on_flushed(&notice);
            }
        }
    }

    fn on_input(&mut self, agent_id: String, data: String) {
        if self.registry.is_muted(&agent_id) {
            debug!(agent_id = %agent_id, len = data.len(), "Dropping input during replay");
            return;
        }
        let Some(filtered) = filter_input(&data) else {
            trace!(agent_id = %agent_id, "Input empty after filtering");
            return;
        };
        let data = filtered.into_owned();
        self.send(ClientMessage::Input { agent_id, data });
    }

    // ==================== Connection State ====================

    fn set_status(&mut self, status: ConnectionStatus) {
        if *self.status.borrow() == status {
            return;
        }
        self.status.send_replace(status);
        debug!(%status, "Connection status changed");
        self.handler.handle(HubEvent::Status(status));
    }

    fn start_connect(&mut self) {
        if self.link.is_some() || self.pending_connect.is_some() {
            return;
        }
        self.intentional_close = false;
        self.set_status(ConnectionStatus::Connecting);

        let url = self.url.clone();
        let timeout = self.connect_timeout;
        self.pending_connect = Some(tokio::spawn(async move {
            transport::connect(&url, timeout).await
        }));
    }

    fn on_connect_result(&mut self, result: Result<Link>) {
        match result {
            Ok(link) => {
                info!(link = %link.id(), url = %self.url, "Connected to Hub");
                self.link = Some(link);
                self.policy.reset();
                self.set_status(ConnectionStatus::Connected);

                for agent_id in self.registry.ids() {
                    self.send(ClientMessage::Subscribe { agent_id });
                }
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "Connect attempt failed");
                self.set_status(ConnectionStatus::Error);
                self.schedule_reconnect();
            }
        }
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Frame(text) => self.dispatch(&text),
            LinkEvent::Error(message) => {
                warn!(error = %message, "Transport error");
                self.set_status(ConnectionStatus::Error);
            }
            LinkEvent::Closed => {
                self.link = None;
                if !self.intentional_close {
                    info!("Connection lost");
                    self.set_status(ConnectionStatus::Disconnected);
                    self.schedule_reconnect();
                }
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.intentional_close || self.reconnect_at.is_some() {
            return;
        }
        let delay = self.policy.next_delay();
        info!(delay_ms = delay.as_millis() as u64, "Reconnecting after delay");
        self.reconnect_at = Some(Instant::now() + delay);
    }

    fn disconnect(&mut self) {
        self.intentional_close = true;
        self.reconnect_at = None;
        if let Some(pending) = self.pending_connect.take() {
            pending.abort();
        }
        if let Some(link) = self.link.take() {
            debug!(link = %link.id(), "Closing link");
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Write a frame if the transport is open; silently dropped otherwise
    fn send(&self, msg: ClientMessage) {
        let Some(link) = &self.link else {
            trace!(agent_id = %msg.agent_id(), "Not connected, dropping outbound message");
            return;
        };
        match encode_client_message(&msg) {
            Ok(text) => {
                if !link.send(text) {
                    debug!(link = %link.id(), "Link task gone, frame dropped");
                }
            }
            Err(e) => warn!(agent_id = %msg.agent_id(), error = %e, "Failed to encode message"),
        }
    }

    // ==================== Inbound Dispatch ====================

    fn dispatch(&mut self, text: &str) {
        let msg = match decode_server_message(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };
        trace!(kind = msg.kind(), agent_id = ?msg.agent_id(), "Frame received");

        match msg {
            ServerMessage::Subscribed { agent_id, buffer } => {
                let Some(bytes) = decode_or_drop(&agent_id, &buffer) else {
                    return;
                };
                let replay = normalize(&bytes).into_owned();
                self.registry.on_replay(&agent_id, replay);
            }
            ServerMessage::Unsubscribed { agent_id } => {
                debug!(agent_id = %agent_id, "Unsubscribe confirmed");
            }
            ServerMessage::Output { agent_id, data } => {
                let Some(bytes) = decode_or_drop(&agent_id, &data) else {
                    return;
                };
                self.registry.on_output(&agent_id, &normalize(&bytes));
            }
            ServerMessage::AgentStateChanged {
                agent_id,
                state,
                agent,
            } => {
                self.handler.handle(HubEvent::AgentStateChanged {
                    agent_id,
                    state,
                    agent,
                });
            }
            ServerMessage::InboxChanged { agent_id, count } => {
                self.handler
                    .handle(HubEvent::InboxChanged { agent_id, count });
            }
            ServerMessage::Error { message } => {
                warn!(message = %message, "Hub reported error");
                self.handler.handle(HubEvent::HubError { message });
            }
        }
    }
}

fn decode_or_drop(agent_id: &str, payload: &str) -> Option<Vec<u8>> {
    match decode_payload(payload) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(agent_id = %agent_id, error = %e, "Dropping frame with bad payload");
            None
        }
    }
}

async fn wait_connect(pending: &mut Option<JoinHandle<Result<Link>>>) -> Result<Link> {
    let Some(handle) = pending.as_mut() else {
        return std::future::pending().await;
    };
    let result = handle.await;
    *pending = None;
    result.unwrap_or_else(|e| Err(HubmuxError::internal(format!("Connect task failed: {}", e))))
}

async fn next_link_event(link: &mut Option<Link>) -> LinkEvent {
    match link {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
