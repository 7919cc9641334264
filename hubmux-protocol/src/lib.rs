//! hubmux-protocol: Wire definitions for the Hub session channel
//!
//! This crate defines the tagged JSON messages exchanged with the Hub over
//! its session socket, the agent records returned by the control API, and
//! the text frame codec used for non-WebSocket transports.

pub mod codec;
pub mod messages;
pub mod payload;
pub mod types;

// Re-export main types at crate root
pub use codec::{decode_server_message, encode_client_message, CodecError, FrameCodec};
pub use messages::{ClientMessage, ServerMessage};
pub use payload::{decode_payload, encode_payload};
pub use types::{
    AgentPolicy, AgentRecord, AgentState, AgentSummary, HubStatus, LaunchPolicy, PolicyPatch,
    ShutdownPolicy,
};
