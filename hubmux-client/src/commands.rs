//! Subcommand execution
//!
//! One-shot commands talk to the control API and print a short report.
//! `attach` wires the local terminal to a session on the channel.

use std::fmt::Write as _;
use std::io::{self, Read};

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use hubmux_protocol::{AgentPolicy, AgentRecord, AgentState, AgentSummary, HubStatus};
use hubmux_utils::{HubmuxError, Result};

use crate::cli::{Args, Command};
use crate::config::{self, Config};
use crate::connection::{ChannelHandler, ConnectionStatus, HubConnection, HubEvent};
use crate::control::{ControlClient, ALIVE_POLL_INTERVAL, ALIVE_WAIT_TIMEOUT};
use crate::terminal::{terminal_size, RawModeGuard, StdoutSink};

/// Ctrl-] ends an attach
pub const DETACH_KEY: u8 = 0x1d;

/// Run the parsed command line
pub async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let control = ControlClient::new(&config.hub.url)?;

    match &args.command {
        Command::Status => {
            let status = control.status().await?;
            print!("{}", format_status(&status));
        }
        Command::List => {
            let agents = control.list().await?;
            print!("{}", format_agents(&agents));
        }
        Command::Show { agent_id } => {
            let record = control.get(agent_id).await?;
            print!("{}", format_record(&record));
        }
        Command::Start { agent_id } => {
            let record = control.start(agent_id).await?;
            println!("{}: {}", record.id, record.state);
        }
        Command::Stop { agent_id } => {
            let record = control.stop(agent_id).await?;
            println!("{}: {}", record.id, record.state);
        }
        Command::Restart { agent_id } => {
            let record = control.restart_session(agent_id).await?;
            println!("{}: session restarted ({})", record.id, record.state);
        }
        Command::Policy { agent_id, .. } => {
            let patch = args.command.policy_patch().unwrap_or_default();
            let policy = control.update_policy(agent_id, &patch).await?;
            print!("{}", format_policy(agent_id, &policy));
        }
        Command::Attach { agent_id, no_wait } => {
            attach(&config, &control, agent_id, !no_wait).await?;
        }
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let path = args.config.clone().unwrap_or_else(config::default_path);
    let config = Config::load(args.config.as_deref())?.with_hub(args.hub.clone());
    // The override may have replaced a valid URL with a bad one
    config.validate(&path)?;
    Ok(config)
}

/// Keystrokes read from the local terminal
#[derive(Debug, PartialEq)]
enum Keys {
    Data(String),
    Detach,
}

async fn attach(config: &Config, control: &ControlClient, agent_id: &str, wait: bool) -> Result<()> {
    let alive = if wait {
        control.wait_until_alive(ALIVE_WAIT_TIMEOUT, ALIVE_POLL_INTERVAL).await
    } else {
        control.is_alive().await
    };
    if !alive {
        return Err(HubmuxError::HubUnreachable {
            url: control.base_url().to_string(),
        });
    }

    let record = control.get(agent_id).await?;
    if !record.state.is_live() {
        eprintln!(
            "{} is {}; output will appear once it starts",
            record.id, record.state
        );
    }

    let (handler, mut events) = ChannelHandler::new();
    let conn = HubConnection::new(config.connection_config()?, handler);
    let mut status = conn.watch_status();
    let mut winch = signal(SignalKind::window_change())?;

    let (keys_tx, mut keys) = mpsc::unbounded_channel();
    spawn_stdin_reader(keys_tx)?;

    let _raw = RawModeGuard::enable()?;
    tracing::info!(agent_id, "Attaching");

    conn.subscribe(agent_id);
    conn.bind(agent_id, StdoutSink::stdout());
    conn.connect();

    loop {
        tokio::select! {
            key = keys.recv() => match key {
                Some(Keys::Data(data)) => conn.input(agent_id, data),
                Some(Keys::Detach) | None => break,
            },
            _ = winch.recv() => {
                let (cols, rows) = terminal_size();
                conn.resize(agent_id, cols, rows);
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                // The Hub re-renders at the new size once told about it
                if *status.borrow_and_update() == ConnectionStatus::Connected {
                    let (cols, rows) = terminal_size();
                    conn.resize(agent_id, cols, rows);
                }
            }
            Some(event) = events.recv() => log_event(agent_id, &event),
        }
    }

    tracing::info!(agent_id, "Detaching");
    conn.shutdown();
    Ok(())
}

fn log_event(agent_id: &str, event: &HubEvent) {
    match event {
        HubEvent::Status(status) => tracing::info!(%status, "Connection status"),
        HubEvent::AgentStateChanged {
            agent_id: id,
            state,
            ..
        } if id == agent_id => {
            if matches!(state, AgentState::Stopped | AgentState::Error | AgentState::Stale) {
                tracing::warn!(agent_id, %state, "Attached agent is no longer running");
            } else {
                tracing::info!(agent_id, %state, "Attached agent state changed");
            }
        }
        HubEvent::AgentStateChanged { .. } => {}
        HubEvent::InboxChanged { agent_id, count } => {
            tracing::debug!(agent_id, count, "Inbox changed");
        }
        HubEvent::HubError { message } => tracing::warn!("Hub error: {}", message),
    }
}

/// Read stdin on a plain thread; a blocking read cannot be cancelled, and
/// the thread ends with the process.
fn spawn_stdin_reader(tx: mpsc::UnboundedSender<Keys>) -> Result<()> {
    std::thread::Builder::new()
        .name("hubmux-stdin".into())
        .spawn(move || {
            let mut stdin = io::stdin().lock();
            let mut buf = [0u8; 1024];
            let mut pending = Vec::new();
            loop {
                let n = match stdin.read(&mut buf) {
                    Ok(0) => {
                        let _ = tx.send(Keys::Detach);
                        return;
                    }
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::warn!("stdin read failed: {}", e);
                        let _ = tx.send(Keys::Detach);
                        return;
                    }
                };

                let (chunk, detach) = split_detach(&buf[..n]);
                pending.extend_from_slice(chunk);
                let text = take_utf8(&mut pending);
                if !text.is_empty() && tx.send(Keys::Data(text)).is_err() {
                    return;
                }
                if detach {
                    let _ = tx.send(Keys::Detach);
                    return;
                }
            }
        })?;
    Ok(())
}

/// Bytes before the detach key, and whether it was pressed
fn split_detach(buf: &[u8]) -> (&[u8], bool) {
    match buf.iter().position(|&b| b == DETACH_KEY) {
        Some(pos) => (&buf[..pos], true),
        None => (buf, false),
    }
}

/// Drain complete UTF-8 from `pending`, keeping a split multi-byte
/// character for the next read.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    match std::str::from_utf8(pending) {
        Ok(s) => {
            let text = s.to_owned();
            pending.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let tail = pending.split_off(e.valid_up_to());
            let text = String::from_utf8_lossy(pending).into_owned();
            *pending = tail;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}

fn format_uptime(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let (hours, rem) = (total / 3600, total % 3600);
    let (minutes, secs) = (rem / 60, rem % 60);
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

fn format_status(status: &HubStatus) -> String {
    let running = status
        .agents
        .iter()
        .filter(|a| a.state == AgentState::Running)
        .count();
    let mut out = format!(
        "Hub up {}, {} agents ({} running)\n",
        format_uptime(status.uptime_seconds),
        status.agents.len(),
        running
    );
    if !status.agents.is_empty() {
        out.push_str(&format_agents(&status.agents));
    }
    out
}

fn format_agents(agents: &[AgentSummary]) -> String {
    if agents.is_empty() {
        return "No agents\n".into();
    }

    let width = agents.iter().map(|a| a.id.len()).max().unwrap_or(0).max(2);
    let mut out = format!("{:<width$}  {:<8}  {:>5}  LAUNCH\n", "ID", "STATE", "INBOX");
    for agent in agents {
        let launch = serde_json::to_value(agent.launch_policy)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{:<width$}  {:<8}  {:>5}  {}",
            agent.id,
            agent.state.to_string(),
            agent.inbox_count,
            launch
        );
    }
    out
}

fn format_record(record: &AgentRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "id:            {}", record.id);
    let _ = writeln!(out, "state:         {}", record.state);
    let _ = writeln!(out, "session alive: {}", record.session_alive);
    let _ = writeln!(out, "inbox:         {}", record.inbox_count);
    if let Some(container) = &record.container_id {
        let _ = writeln!(out, "container:     {}", container);
    }
    if let Some(started) = &record.started_at {
        let _ = writeln!(out, "started:       {}", started);
    }
    if let Some(activity) = &record.last_activity {
        let _ = writeln!(out, "last activity: {}", activity);
    }
    out.push_str(&format_policy(&record.id, &record.policy));
    out
}

fn format_policy(agent_id: &str, policy: &AgentPolicy) -> String {
    let name = |v: serde_json::Result<serde_json::Value>| {
        v.ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default()
    };
    format!(
        "{} policy: launch={} shutdown={} idle_timeout={}m\n",
        agent_id,
        name(serde_json::to_value(policy.launch)),
        name(serde_json::to_value(policy.shutdown)),
        policy.idle_timeout_minutes
    )
}
