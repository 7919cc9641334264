//! Outbound keystroke filtering
//!
//! Replaying a backlog that contains device-attribute queries makes the
//! local terminal answer them. Those answers arrive on stdin looking like
//! typed input and must never reach the remote program.

use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Primary (`CSI ? … c`) and secondary (`CSI > … c`) DA responses
    static ref DA_RESPONSE: Regex = Regex::new(r"\x1b\[[?>][0-9;]*c").unwrap();
}

/// Remove device-attribute responses from outbound input.
///
/// Returns `None` when nothing is left to send.
pub fn filter_input(data: &str) -> Option<Cow<'_, str>> {
    let filtered = DA_RESPONSE.replace_all(data, "");
    if filtered.is_empty() {
        None
    } else {
        Some(filtered)
    }
}
