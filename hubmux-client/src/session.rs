//! Per-session state: sinks, replay mute, and resize coordination

mod registry;
mod resize;
mod sink;

pub use registry::{FlushNotifier, ReplayFlushed, SessionRegistry};
pub use resize::{OutputMode, ResizeCoordinator};
pub use sink::{CaptureSink, FlushCallback, SinkEvent, TerminalSink};
