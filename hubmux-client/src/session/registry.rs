//! Session registry
//!
//! Owns every subscribed session and every bound sink. Subscription and
//! binding are independent: a session can be subscribed before a sink is
//! bound and vice versa, and output only reaches a sink when both exist.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use super::resize::{OutputMode, ResizeCoordinator};
use super::sink::TerminalSink;

/// A replay write finished; sent from the sink's flush callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayFlushed {
    pub agent_id: String,
    pub generation: u64,
}

/// Called from a sink's flush callback, possibly on another thread
pub type FlushNotifier = Arc<dyn Fn(ReplayFlushed) + Send + Sync>;

#[derive(Debug, Default)]
struct Session {
    /// Outbound input is dropped while a replay is being written
    muted: bool,
    /// Generation of the replay write that set `muted`
    replay_generation: u64,
    /// Last `subscribed` buffer, already normalized
    last_replay: Vec<u8>,
    resize: ResizeCoordinator,
}

/// Registry of subscribed sessions and bound sinks
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    sinks: HashMap<String, Box<dyn TerminalSink>>,
    notify: FlushNotifier,
    next_generation: u64,
    rerender_fallback: Duration,
}

impl SessionRegistry {
    /// Flush notices for replay writes are handed to `notify`
    pub fn new(rerender_fallback: Duration, notify: FlushNotifier) -> Self {
        Self {
            sessions: HashMap::new(),
            sinks: HashMap::new(),
            notify,
            next_generation: 0,
            rerender_fallback,
        }
    }

    /// Register a session. Returns false if it already exists.
    pub fn insert(&mut self, agent_id: &str) -> bool {
        if self.sessions.contains_key(agent_id) {
            return false;
        }
        self.sessions.insert(agent_id.to_string(), Session::default());
        true
    }

    /// Tear down a session, dropping its mute and fallback state
    pub fn remove(&mut self, agent_id: &str) -> bool {
        self.sessions.remove(agent_id).is_some()
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.sessions.contains_key(agent_id)
    }

    /// Registered session ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Bind a sink, replacing any previous one
    pub fn bind(&mut self, agent_id: &str, sink: Box<dyn TerminalSink>) {
        self.sinks.insert(agent_id.to_string(), sink);
    }

    /// Unbind a sink; clears fallback and mute state for the session
    pub fn unbind(&mut self, agent_id: &str) -> Option<Box<dyn TerminalSink>> {
        if let Some(session) = self.sessions.get_mut(agent_id) {
            session.muted = false;
            session.resize.cancel();
        }
        self.sinks.remove(agent_id)
    }

    pub fn is_bound(&self, agent_id: &str) -> bool {
        self.sinks.contains_key(agent_id)
    }

    pub fn is_muted(&self, agent_id: &str) -> bool {
        self.sessions.get(agent_id).is_some_and(|s| s.muted)
    }

    /// Handle a replay buffer from a `subscribed` frame
    ///
    /// The buffer is kept for the re-render fallback. When a sink is bound
    /// and the buffer is not empty it is written with a flush callback and
    /// the session stays muted until that callback fires. A replay also
    /// counts as the re-render for any pending resize.
    pub fn on_replay(&mut self, agent_id: &str, buffer: Vec<u8>) -> bool {
        let Some(session) = self.sessions.get_mut(agent_id) else {
            debug!(agent_id = %agent_id, "Dropping replay for unknown session");
            return false;
        };
        session.last_replay = buffer;
        session.resize.cancel();

        let Some(sink) = self.sinks.get_mut(agent_id) else {
            trace!(agent_id = %agent_id, "Replay stored, no sink bound");
            return false;
        };
        if session.last_replay.is_empty() {
            return false;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        session.muted = true;
        session.replay_generation = generation;

        let notice = ReplayFlushed {
            agent_id: agent_id.to_string(),
            generation,
        };
        let notify = self.notify.clone();
        sink.write(&session.last_replay, Some(Box::new(move || notify(notice))));
        true
    }

    /// Lift the mute if the notice belongs to the current replay
    pub fn on_flushed(&mut self, notice: &ReplayFlushed) -> bool {
        match self.sessions.get_mut(&notice.agent_id) {
            Some(session) if session.muted && session.replay_generation == notice.generation => {
                session.muted = false;
                true
            }
            _ => {
                trace!(
                    agent_id = %notice.agent_id,
                    generation = notice.generation,
                    "Ignoring stale replay flush"
                );
                false
            }
        }
    }

    /// Deliver an output chunk. Returns false if it was dropped.
    pub fn on_output(&mut self, agent_id: &str, data: &[u8]) -> bool {
        let (Some(session), Some(sink)) =
            (self.sessions.get_mut(agent_id), self.sinks.get_mut(agent_id))
        else {
            trace!(agent_id = %agent_id, "Dropping output, session not subscribed and bound");
            return false;
        };

        match session.resize.on_output() {
            OutputMode::Append => {}
            OutputMode::Replace => {
                debug!(agent_id = %agent_id, "Re-render after resize, replacing screen");
                sink.clear();
            }
        }
        sink.write(data, None);
        true
    }

    /// Prepare the sink for a resize and arm the re-render fallback
    pub fn begin_resize(&mut self, agent_id: &str, cols: u16, rows: u16, now: Instant) -> bool {
        let Some(session) = self.sessions.get_mut(agent_id) else {
            return false;
        };
        if let Some(sink) = self.sinks.get_mut(agent_id) {
            sink.clear();
            sink.resize(cols, rows);
        }
        session.resize.request(now + self.rerender_fallback);
        true
    }

    /// Earliest pending re-render deadline across all sessions
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sessions
            .values()
            .filter_map(|s| s.resize.deadline())
            .min()
    }

    /// Write the last replay buffer for every session whose re-render
    /// deadline has passed. Returns how many fallbacks fired.
    pub fn fire_expired(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        for (agent_id, session) in self.sessions.iter_mut() {
            if !session.resize.expire(now) {
                continue;
            }
            fired += 1;
            debug!(agent_id = %agent_id, "No re-render before deadline, showing last replay");
            if let Some(sink) = self.sinks.get_mut(agent_id) {
                if !session.last_replay.is_empty() {
                    sink.write(&session.last_replay, None);
                }
            }
        }
        fired
    }
}
