//! Local terminal handling for attached sessions
//!
//! The attached session draws directly onto the user's terminal, so raw mode
//! is enabled but the alternate screen is left alone: the remote program
//! manages its own screen and the normalizer keeps it from switching.

use std::io::{self, Stdout, Write};

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use hubmux_utils::Result;

use crate::session::{FlushCallback, TerminalSink};

/// Size assumed when the terminal cannot be queried
pub const FALLBACK_SIZE: (u16, u16) = (80, 24);

const CLEAR_SCREEN: &[u8] = b"\x1b[2J\x1b[H";

/// Current size of the controlling terminal as (columns, rows)
pub fn terminal_size() -> (u16, u16) {
    crossterm::terminal::size().unwrap_or(FALLBACK_SIZE)
}

/// Sink that writes session output to any byte writer
pub struct WriterSink<W: Write + Send> {
    out: W,
    size: (u16, u16),
}

/// Sink for the process's own terminal
pub type StdoutSink = WriterSink<Stdout>;

impl StdoutSink {
    pub fn stdout() -> Self {
        WriterSink::new(io::stdout(), terminal_size())
    }
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(out: W, size: (u16, u16)) -> Self {
        Self { out, size }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, data: &[u8]) {
        if let Err(e) = self.out.write_all(data).and_then(|_| self.out.flush()) {
            tracing::warn!("Terminal write failed: {}", e);
        }
    }
}

impl<W: Write + Send> TerminalSink for WriterSink<W> {
    fn write(&mut self, data: &[u8], on_flushed: Option<FlushCallback>) {
        self.emit(data);
        // Written and flushed synchronously, so the data is already out
        if let Some(done) = on_flushed {
            done();
        }
    }

    fn clear(&mut self) {
        self.emit(CLEAR_SCREEN);
    }

    fn size(&self) -> (u16, u16) {
        self.size
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.size = (cols, rows);
    }
}

/// Keeps the terminal in raw mode for as long as it lives
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn enable() -> Result<Self> {
        enable_raw_mode()?;
        Ok(Self { _private: () })
    }

    fn restore() -> Result<()> {
        disable_raw_mode()?;
        Ok(())
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = Self::restore() {
            tracing::error!("Failed to restore terminal: {}", e);
        }
    }
}
