//! Connection handle for the Hub session channel

use std::time::Duration;

use tokio::sync::{mpsc, watch};

use super::backoff::ReconnectPolicy;
use super::handler::{ConnectionStatus, EventHandler};
use super::reactor::Reactor;
use crate::session::{ReplayFlushed, TerminalSink};

/// Default session channel address
pub const DEFAULT_WS_URL: &str = "ws://localhost:9000/ws";

/// Default bound on a single connect attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default wait for a re-render after resize
pub const DEFAULT_RERENDER_FALLBACK: Duration = Duration::from_millis(1500);

/// Settings for one connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Session channel address (ws, wss, tcp or unix URL)
    pub url: String,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub rerender_fallback: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
            rerender_fallback: DEFAULT_RERENDER_FALLBACK,
        }
    }
}

/// Requests from the handle to the reactor
pub(crate) enum Command {
    Connect,
    Disconnect,
    Shutdown,
    Subscribe(String),
    Unsubscribe(String),
    Bind(String, Box<dyn TerminalSink>),
    Unbind(String),
    Input { agent_id: String, data: String },
    Resize { agent_id: String, cols: u16, rows: u16 },
    /// Sent by a sink's flush callback, so it is ordered with input
    ReplayFlushed(ReplayFlushed),
}

/// Handle to a multiplexed Hub connection
///
/// Every method enqueues a command for the connection's reactor task and
/// returns immediately. Clones drive the same connection. Once the reactor
/// has shut down, calls are ignored.
#[derive(Clone)]
pub struct HubConnection {
    tx: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
}

impl HubConnection {
    /// Spawn the reactor for a new, not yet connected, connection.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ConnectionConfig, handler: impl EventHandler + 'static) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(ConnectionStatus::Idle);

        let reactor = Reactor::new(config, Box::new(handler), status_tx, tx.downgrade());
        tokio::spawn(reactor.run(rx));

        Self { tx, status }
    }

    fn command(&self, cmd: Command) {
        // Reactor gone: nothing left to drive
        let _ = self.tx.send(cmd);
    }

    /// Open the transport; reconnects automatically until disconnected
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close the transport without reconnecting. Idempotent.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Disconnect and stop the reactor
    pub fn shutdown(&self) {
        self.command(Command::Shutdown);
    }

    /// Register a session and ask the Hub for its output
    pub fn subscribe(&self, agent_id: impl Into<String>) {
        self.command(Command::Subscribe(agent_id.into()));
    }

    /// Drop a session locally and tell the Hub
    pub fn unsubscribe(&self, agent_id: impl Into<String>) {
        self.command(Command::Unsubscribe(agent_id.into()));
    }

    /// Route a session's output to `sink`
    pub fn bind(&self, agent_id: impl Into<String>, sink: impl TerminalSink + 'static) {
        self.command(Command::Bind(agent_id.into(), Box::new(sink)));
    }

    pub fn unbind(&self, agent_id: impl Into<String>) {
        self.command(Command::Unbind(agent_id.into()));
    }

    /// Send keystrokes to a session
    pub fn input(&self, agent_id: impl Into<String>, data: impl Into<String>) {
        self.command(Command::Input {
            agent_id: agent_id.into(),
            data: data.into(),
        });
    }

    /// Resize a session's PTY
    pub fn resize(&self, agent_id: impl Into<String>, cols: u16, rows: u16) {
        self.command(Command::Resize {
            agent_id: agent_id.into(),
            cols,
            rows,
        });
    }

    /// Current status
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Receiver that observes every status change
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Wait until the status equals `want`.
    ///
    /// Returns false if the reactor stopped first.
    pub async fn wait_for_status(&self, want: ConnectionStatus) -> bool {
        let mut rx = self.status.clone();
        let reached = rx.wait_for(|status| *status == want).await.is_ok();
        reached
    }

    /// Whether the reactor task has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::handler::NullHandler;

    #[test]
    fn test_connection_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.url, "ws://localhost:9000/ws");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.rerender_fallback, Duration::from_millis(1500));
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }

    #[tokio::test]
    async fn test_new_connection_is_idle() {
        let conn = HubConnection::new(ConnectionConfig::default(), NullHandler);
        assert_eq!(conn.status(), ConnectionStatus::Idle);
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_stops_reactor() {
        let conn = HubConnection::new(ConnectionConfig::default(), NullHandler);
        conn.shutdown();

        tokio::time::timeout(Duration::from_secs(2), async {
            while !conn.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        // Calls after shutdown are ignored
        conn.subscribe("x");
        conn.input("x", "ls\r");
    }

    #[tokio::test]
    async fn test_failed_connect_reports_error() {
        let config = ConnectionConfig {
            url: "tcp://127.0.0.1:1".into(),
            ..ConnectionConfig::default()
        };
        let conn = HubConnection::new(config, NullHandler);
        let mut status = conn.watch_status();
        conn.connect();

        status
            .wait_for(|s| *s == ConnectionStatus::Error)
            .await
            .unwrap();
        conn.shutdown();
    }
}
