//! Rendering surface interface

use std::sync::Arc;

use parking_lot::Mutex;

/// Invoked once the sink has fully processed a write
pub type FlushCallback = Box<dyn FnOnce() + Send>;

/// Byte consumer bound to a session
///
/// Implementations are driven from the connection reactor and must not
/// block. A flush callback, when given, has to be invoked exactly once
/// after `data` has been consumed; it may be called from any thread.
pub trait TerminalSink: Send {
    /// Consume a chunk of normalized output
    fn write(&mut self, data: &[u8], on_flushed: Option<FlushCallback>);

    /// Clear the visible screen
    fn clear(&mut self);

    /// Current size as (columns, rows)
    fn size(&self) -> (u16, u16);

    /// Adopt new dimensions
    fn resize(&mut self, cols: u16, rows: u16);
}

/// Something that happened to a [`CaptureSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Write(Vec<u8>),
    Clear,
    Resize(u16, u16),
}

#[derive(Default)]
struct CaptureState {
    events: Vec<SinkEvent>,
    size: (u16, u16),
    defer_flush: bool,
    pending: Vec<FlushCallback>,
}

/// In-memory sink that records everything it receives
///
/// Clones share state, so one clone can be bound to a session while another
/// is inspected. Used by headless consumers and tests.
#[derive(Clone, Default)]
pub struct CaptureSink {
    state: Arc<Mutex<CaptureState>>,
}

impl CaptureSink {
    pub fn new(cols: u16, rows: u16) -> Self {
        let sink = Self::default();
        sink.state.lock().size = (cols, rows);
        sink
    }

    /// Hold flush callbacks until [`CaptureSink::flush`] is called
    pub fn deferring_flush(self) -> Self {
        self.state.lock().defer_flush = true;
        self
    }

    /// Fire held flush callbacks, returning how many ran
    pub fn flush(&self) -> usize {
        let pending = std::mem::take(&mut self.state.lock().pending);
        let count = pending.len();
        for callback in pending {
            callback();
        }
        count
    }

    /// Everything recorded so far
    pub fn events(&self) -> Vec<SinkEvent> {
        self.state.lock().events.clone()
    }

    /// Concatenation of all writes since the last clear
    pub fn screen(&self) -> Vec<u8> {
        let state = self.state.lock();
        let start = state
            .events
            .iter()
            .rposition(|e| matches!(e, SinkEvent::Clear))
            .map_or(0, |i| i + 1);
        state.events[start..]
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Write(data) => Some(data.as_slice()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .concat()
    }

    /// Number of writes recorded
    pub fn write_count(&self) -> usize {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Write(_)))
            .count()
    }
}

impl TerminalSink for CaptureSink {
    fn write(&mut self, data: &[u8], on_flushed: Option<FlushCallback>) {
        let callback = {
            let mut state = self.state.lock();
            state.events.push(SinkEvent::Write(data.to_vec()));
            match on_flushed {
                Some(cb) if state.defer_flush => {
                    state.pending.push(cb);
                    None
                }
                other => other,
            }
        };
        // Outside the lock: the callback may re-enter through a clone
        if let Some(cb) = callback {
            cb();
        }
    }

    fn clear(&mut self) {
        self.state.lock().events.push(SinkEvent::Clear);
    }

    fn size(&self) -> (u16, u16) {
        self.state.lock().size
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        let mut state = self.state.lock();
        state.size = (cols, rows);
        state.events.push(SinkEvent::Resize(cols, rows));
    }
}
