//! Escape sequence handling for session streams
//!
//! Output from the Hub is produced by full-screen programs running inside a
//! remote multiplexer. Only a handful of sequences are rewritten before the
//! bytes reach the local terminal; everything else passes through untouched.

mod input;
mod normalize;

pub use input::filter_input;
pub use normalize::{normalize, ALT_SCREEN_MODES, MOUSE_MODES};
