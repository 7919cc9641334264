//! Hub session channel connection management
//!
//! One multiplexed transport carries every subscribed session. The
//! connection reconnects with exponential backoff and resubscribes all
//! registered sessions whenever the transport comes back.

mod backoff;
mod client;
mod handler;
mod reactor;
mod transport;

pub use backoff::ReconnectPolicy;
pub use client::{ConnectionConfig, HubConnection};
pub use client::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_RERENDER_FALLBACK, DEFAULT_WS_URL};
pub use handler::{
    CallbackHandler, ChannelHandler, ConnectionStatus, EventHandler, HubEvent, NullHandler,
};
pub use transport::Endpoint;
