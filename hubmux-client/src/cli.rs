//! Command-line argument parsing for the hubmux client
//!
//! Uses clap for argument parsing with derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use hubmux_protocol::{LaunchPolicy, PolicyPatch, ShutdownPolicy};
use hubmux_utils::{LogConfig, LogOutput};

/// hubmux - attach to and manage agents hosted by a Hub
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Hub control API URL
    ///
    /// Overrides `hub.url` from the config file. The session channel URL
    /// is derived from it.
    /// Example: http://10.0.0.5:9000
    #[arg(long, global = true, env = "HUBMUX_HUB")]
    pub hub: Option<String>,

    /// Config file path
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level (to the log file while attached)
    #[arg(long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Show Hub uptime and agent overview
    Status,

    /// List agents
    #[command(alias = "ls")]
    List,

    /// Show one agent
    Show { agent_id: String },

    /// Start an agent
    Start { agent_id: String },

    /// Stop an agent
    Stop { agent_id: String },

    /// Restart an agent's terminal session without restarting its container
    Restart { agent_id: String },

    /// Show or change an agent's launch/shutdown policy
    Policy {
        agent_id: String,

        /// manual, auto-on-task or always-on
        #[arg(long, value_parser = parse_launch)]
        launch: Option<LaunchPolicy>,

        /// manual, on-inbox-empty or idle-timeout
        #[arg(long, value_parser = parse_shutdown)]
        shutdown: Option<ShutdownPolicy>,

        /// Minutes of inactivity before an idle-timeout shutdown
        #[arg(long)]
        idle_timeout: Option<u32>,
    },

    /// Attach the terminal to an agent's session (detach with Ctrl-])
    Attach {
        agent_id: String,

        /// Fail immediately instead of waiting for the Hub to come up
        #[arg(long, default_value_t = false)]
        no_wait: bool,
    },
}

impl Args {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Whether this run takes over the terminal
    pub fn is_interactive(&self) -> bool {
        matches!(self.command, Command::Attach { .. })
    }

    /// Logging preset for this run
    ///
    /// An attached session owns the terminal, so it never logs to stderr.
    pub fn log_config(&self) -> LogConfig {
        match (self.verbose, self.is_interactive()) {
            (true, true) => LogConfig {
                output: LogOutput::File,
                ..LogConfig::development()
            },
            (true, false) => LogConfig::development(),
            (false, true) => LogConfig::client(),
            (false, false) => LogConfig::command(),
        }
    }
}

impl Command {
    /// Policy fields given on the command line, if this is `policy`
    pub fn policy_patch(&self) -> Option<PolicyPatch> {
        match self {
            Command::Policy {
                launch,
                shutdown,
                idle_timeout,
                ..
            } => Some(PolicyPatch {
                launch: *launch,
                shutdown: *shutdown,
                idle_timeout_minutes: *idle_timeout,
            }),
            _ => None,
        }
    }
}

/// Policy names are accepted with either dashes or underscores
fn policy_value<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, String> {
    let name = s.trim().to_ascii_lowercase().replace('-', "_");
    serde_json::from_value(serde_json::Value::String(name))
        .map_err(|_| format!("unknown policy '{}'", s))
}

fn parse_launch(s: &str) -> Result<LaunchPolicy, String> {
    policy_value(s)
}

fn parse_shutdown(s: &str) -> Result<ShutdownPolicy, String> {
    policy_value(s)
}
