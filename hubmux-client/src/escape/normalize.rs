//! Output normalization
//!
//! Rules:
//!
//! - Strip mouse-tracking private-mode set/reset (`CSI ? Pm h|l`).
//! - Strip alternate-screen private-mode set/reset.
//! - Rewrite clear-scrollback `CSI 3 J` to clear-screen `CSI 2 J`.
//! - Strip full reset `ESC c`.
//!
//! A compound private-mode sequence keeps whatever parameters are not
//! targeted. Bytes are copied one at a time and the tail of the output is
//! checked after each one, so the output never holds a match. A sequence
//! that only forms once a neighbour is removed is caught as soon as its
//! last byte arrives. Each rule ends on a different byte, so at most one
//! can apply at any step.

use std::borrow::Cow;

/// Mouse-tracking private modes (X10, VT200, highlight, button, any-event,
/// UTF-8, SGR, urxvt, SGR-pixel)
pub const MOUSE_MODES: &[u32] = &[9, 1000, 1001, 1002, 1003, 1005, 1006, 1015, 1016];

/// Alternate screen buffer private modes
pub const ALT_SCREEN_MODES: &[u32] = &[47, 1047, 1049];

const ESC: u8 = 0x1b;
const FULL_RESET: &[u8] = b"\x1bc";
const CLEAR_SCROLLBACK: &[u8] = b"\x1b[3J";
const PRIVATE_MODE_PREFIX: &[u8] = b"\x1b[?";

/// Normalize a chunk of PTY output for local display.
///
/// Returns the input borrowed when no rule matches. Idempotent:
/// `normalize(&normalize(x)) == normalize(x)`. Runs in time linear in
/// the input, however deeply removals nest.
pub fn normalize(input: &[u8]) -> Cow<'_, [u8]> {
    if !input.contains(&ESC) {
        return Cow::Borrowed(input);
    }

    let mut out = Vec::with_capacity(input.len());
    let mut changed = false;
    for &byte in input {
        out.push(byte);
        changed |= rewrite_tail(&mut out);
    }

    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(input)
    }
}

/// Apply the one rule that can end at the last byte, if it matches
fn rewrite_tail(out: &mut Vec<u8>) -> bool {
    match out.last() {
        Some(b'c') => strip_full_reset(out),
        Some(b'J') => rewrite_clear_scrollback(out),
        Some(b'h' | b'l') => strip_private_modes(out),
        _ => false,
    }
}

fn strip_full_reset(out: &mut Vec<u8>) -> bool {
    if !out.ends_with(FULL_RESET) {
        return false;
    }
    out.truncate(out.len() - FULL_RESET.len());
    true
}

fn rewrite_clear_scrollback(out: &mut [u8]) -> bool {
    if !out.ends_with(CLEAR_SCROLLBACK) {
        return false;
    }
    let n = out.len();
    out[n - 2] = b'2';
    true
}

fn is_targeted(param: &[u8]) -> bool {
    std::str::from_utf8(param)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .is_some_and(|mode| MOUSE_MODES.contains(&mode) || ALT_SCREEN_MODES.contains(&mode))
}

/// Remove targeted modes from a `CSI ? Pm h|l` ending the output.
///
/// A sequence left with no meaningful parameters is dropped entirely.
fn strip_private_modes(out: &mut Vec<u8>) -> bool {
    let Some((&action, body)) = out.split_last() else {
        return false;
    };
    let digits = body
        .iter()
        .rev()
        .take_while(|b| b.is_ascii_digit() || **b == b';')
        .count();
    let start = body.len() - digits;
    if !body[..start].ends_with(PRIVATE_MODE_PREFIX) {
        return false;
    }

    let params: Vec<&[u8]> = body[start..].split(|b| *b == b';').collect();
    let kept: Vec<&[u8]> = params.iter().copied().filter(|p| !is_targeted(p)).collect();
    if kept.len() == params.len() {
        return false;
    }

    let mut replacement = Vec::new();
    if kept.iter().any(|p| !p.is_empty()) {
        replacement.extend_from_slice(PRIVATE_MODE_PREFIX);
        replacement.extend_from_slice(&kept.join(&b';'));
        replacement.push(action);
    }
    out.truncate(start - PRIVATE_MODE_PREFIX.len());
    out.extend_from_slice(&replacement);
    true
}
