//! Resize-triggered re-render coordination
//!
//! After a resize the remote program redraws its whole screen. The next
//! output chunk therefore replaces what the sink shows instead of being
//! appended to it. If no output arrives before the deadline the caller
//! falls back to the last replay buffer.

use tokio::time::Instant;

/// How the next output chunk should reach the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Incremental update, write as-is
    Append,
    /// Full re-render, clear the sink first
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResizeState {
    Idle,
    AwaitingRerender { deadline: Instant },
}

/// Per-session resize state machine
#[derive(Debug, Clone)]
pub struct ResizeCoordinator {
    state: ResizeState,
}

impl ResizeCoordinator {
    pub fn new() -> Self {
        Self {
            state: ResizeState::Idle,
        }
    }

    /// A resize was sent; expect a re-render before `deadline`
    ///
    /// A second request while one is pending moves the deadline.
    pub fn request(&mut self, deadline: Instant) {
        self.state = ResizeState::AwaitingRerender { deadline };
    }

    /// Output arrived; decides how it is written and cancels the fallback
    pub fn on_output(&mut self) -> OutputMode {
        match std::mem::replace(&mut self.state, ResizeState::Idle) {
            ResizeState::Idle => OutputMode::Append,
            ResizeState::AwaitingRerender { .. } => OutputMode::Replace,
        }
    }

    /// Returns true exactly once when the fallback deadline has passed
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.state {
            ResizeState::AwaitingRerender { deadline } if deadline <= now => {
                self.state = ResizeState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Drop any pending re-render
    pub fn cancel(&mut self) {
        self.state = ResizeState::Idle;
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            ResizeState::Idle => None,
            ResizeState::AwaitingRerender { deadline } => Some(deadline),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline().is_some()
    }
}

impl Default for ResizeCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
