//! Application event handler trait and utilities

use hubmux_protocol::{AgentRecord, AgentState};
use tokio::sync::mpsc;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Never connected, or shut down
    Idle,
    Connecting,
    Connected,
    /// Closed, either on request or while waiting to reconnect
    Disconnected,
    /// Transport fault; a reconnect follows unless disconnected
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Events for the application outside the terminal streams
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// Connection status transition
    Status(ConnectionStatus),
    /// An agent changed lifecycle state
    AgentStateChanged {
        agent_id: String,
        state: AgentState,
        agent: AgentRecord,
    },
    /// An agent's inbox size changed
    InboxChanged { agent_id: String, count: u32 },
    /// Hub reported an error not tied to a session
    HubError { message: String },
}

/// Trait for consuming hub events
///
/// Called on the connection reactor; implementations must not block.
pub trait EventHandler: Send {
    fn handle(&mut self, event: HubEvent);
}

/// Simple callback-based handler
pub struct CallbackHandler<F>
where
    F: FnMut(HubEvent) + Send,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: FnMut(HubEvent) + Send,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> EventHandler for CallbackHandler<F>
where
    F: FnMut(HubEvent) + Send,
{
    fn handle(&mut self, event: HubEvent) {
        (self.callback)(event);
    }
}

/// Forwards events into an unbounded channel
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<HubEvent>,
}

impl ChannelHandler {
    /// Create a handler and the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HubEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventHandler for ChannelHandler {
    fn handle(&mut self, event: HubEvent) {
        // Receiver gone means nobody is interested any more
        let _ = self.tx.send(event);
    }
}

/// Discards every event
#[derive(Debug, Default)]
pub struct NullHandler;

impl EventHandler for NullHandler {
    fn handle(&mut self, _event: HubEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_handler() {
        let mut received = Vec::new();
        {
            let mut handler = CallbackHandler::new(|event| received.push(event));
            handler.handle(HubEvent::Status(ConnectionStatus::Connecting));
            handler.handle(HubEvent::InboxChanged {
                agent_id: "qa".into(),
                count: 3,
            });
        }
        assert_eq!(received.len(), 2);
        assert_eq!(received[0], HubEvent::Status(ConnectionStatus::Connecting));
    }

    #[test]
    fn test_channel_handler() {
        let (mut handler, mut rx) = ChannelHandler::new();
        handler.handle(HubEvent::HubError {
            message: "boom".into(),
        });
        assert_eq!(
            rx.try_recv().unwrap(),
            HubEvent::HubError {
                message: "boom".into()
            }
        );
    }

    #[test]
    fn test_channel_handler_receiver_dropped() {
        let (mut handler, rx) = ChannelHandler::new();
        drop(rx);
        // Must not panic
        handler.handle(HubEvent::Status(ConnectionStatus::Idle));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
        assert_eq!(ConnectionStatus::Error.to_string(), "error");
    }
}
