//! Session channel message types
//!
//! Frames are JSON objects tagged by `type`. PTY payloads travel as base64
//! text (see [`crate::payload`]); the variants here keep them encoded so a
//! frame with a corrupt payload can be rejected at dispatch time without
//! failing the whole decode.

use serde::{Deserialize, Serialize};

use crate::types::{AgentRecord, AgentState};

/// Messages sent from client to Hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving PTY output for an agent
    Subscribe { agent_id: String },

    /// Stop receiving PTY output for an agent
    Unsubscribe { agent_id: String },

    /// Keystrokes for an agent's PTY
    Input { agent_id: String, data: String },

    /// Resize an agent's PTY
    Resize { agent_id: String, cols: u16, rows: u16 },
}

impl ClientMessage {
    /// Agent this message targets
    pub fn agent_id(&self) -> &str {
        match self {
            Self::Subscribe { agent_id }
            | Self::Unsubscribe { agent_id }
            | Self::Input { agent_id, .. }
            | Self::Resize { agent_id, .. } => agent_id,
        }
    }
}

/// Messages sent from Hub to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Subscription confirmed; `buffer` is the base64 backlog (may be empty)
    Subscribed { agent_id: String, buffer: String },

    /// Unsubscription confirmed
    Unsubscribed { agent_id: String },

    /// Base64 PTY output chunk
    Output { agent_id: String, data: String },

    /// Agent lifecycle transition with the full record
    AgentStateChanged {
        agent_id: String,
        state: AgentState,
        agent: AgentRecord,
    },

    /// Inbox size changed
    InboxChanged { agent_id: String, count: u32 },

    /// Hub-side error not tied to a session
    Error { message: String },
}

impl ServerMessage {
    /// Agent this frame refers to; `None` only for the global `error` frame
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::Subscribed { agent_id, .. }
            | Self::Unsubscribed { agent_id }
            | Self::Output { agent_id, .. }
            | Self::AgentStateChanged { agent_id, .. }
            | Self::InboxChanged { agent_id, .. } => Some(agent_id),
            Self::Error { .. } => None,
        }
    }

    /// Short tag name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Subscribed { .. } => "subscribed",
            Self::Unsubscribed { .. } => "unsubscribed",
            Self::Output { .. } => "output",
            Self::AgentStateChanged { .. } => "agent_state_changed",
            Self::InboxChanged { .. } => "inbox_changed",
            Self::Error { .. } => "error",
        }
    }
}
