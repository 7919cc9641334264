//! hubmux-client: terminal session client for the agent Hub
//!
//! A single multiplexed connection carries the PTY streams of every
//! subscribed agent. Output is normalized for the local terminal, replays
//! mute input until they are drawn, and resizes fall back to the last replay
//! when the remote program does not re-render. The control API is reached
//! through [`ControlClient`].

pub mod cli;
pub mod commands;
pub mod config;
pub mod connection;
pub mod control;
pub mod escape;
pub mod session;
pub mod terminal;

pub use config::Config;
pub use connection::{
    CallbackHandler, ChannelHandler, ConnectionConfig, ConnectionStatus, EventHandler,
    HubConnection, HubEvent, NullHandler, ReconnectPolicy,
};
pub use control::ControlClient;
pub use session::{CaptureSink, FlushCallback, SinkEvent, TerminalSink};
pub use terminal::StdoutSink;
