//! Agent records shared by the session channel and the control API

use serde::{Deserialize, Serialize};

/// Lifecycle state of a Hub-hosted agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Stopped,
    Starting,
    Running,
    /// Container is up but its session has died
    Stale,
    Stopping,
    Error,
}

impl AgentState {
    /// Whether the agent has a live PTY worth attaching to
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stale => "stale",
            Self::Stopping => "stopping",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// When the Hub launches an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchPolicy {
    Manual,
    AutoOnTask,
    AlwaysOn,
}

/// When the Hub shuts an agent down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    Manual,
    OnInboxEmpty,
    IdleTimeout,
}

/// Launch/shutdown policy for one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentPolicy {
    pub launch: LaunchPolicy,
    pub shutdown: ShutdownPolicy,
    pub idle_timeout_minutes: u32,
}

impl Default for AgentPolicy {
    fn default() -> Self {
        Self {
            launch: LaunchPolicy::Manual,
            shutdown: ShutdownPolicy::Manual,
            idle_timeout_minutes: 30,
        }
    }
}

impl AgentPolicy {
    /// Policy with every field present in `patch` replaced
    pub fn patched(self, patch: &PolicyPatch) -> Self {
        Self {
            launch: patch.launch.unwrap_or(self.launch),
            shutdown: patch.shutdown.unwrap_or(self.shutdown),
            idle_timeout_minutes: patch.idle_timeout_minutes.unwrap_or(self.idle_timeout_minutes),
        }
    }
}

/// Partial policy update; absent fields keep their current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch: Option<LaunchPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown: Option<ShutdownPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_minutes: Option<u32>,
}

impl PolicyPatch {
    /// True if the patch would change nothing
    pub fn is_empty(&self) -> bool {
        self.launch.is_none() && self.shutdown.is_none() && self.idle_timeout_minutes.is_none()
    }
}

/// Full agent record as served by `/api/agents` and carried in
/// `agent_state_changed` frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub state: AgentState,
    pub policy: AgentPolicy,
    #[serde(default)]
    pub container_id: Option<String>,
    /// ISO-8601 timestamp, passed through untouched
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub last_activity: Option<String>,
    #[serde(default)]
    pub inbox_count: u32,
    #[serde(default)]
    pub pty_attached: bool,
    #[serde(default)]
    pub session_alive: bool,
}

/// Condensed agent entry from `/api/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: String,
    pub state: AgentState,
    pub inbox_count: u32,
    pub launch_policy: LaunchPolicy,
}

/// Hub-wide status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubStatus {
    pub agents: Vec<AgentSummary>,
    pub uptime_seconds: f64,
}
