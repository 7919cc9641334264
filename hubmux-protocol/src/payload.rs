//! Base64 framing for binary PTY payloads

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::codec::CodecError;

/// Encode raw PTY bytes for a text frame
pub fn encode_payload(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode a base64 payload from a text frame
///
/// An empty string decodes to an empty buffer (the Hub sends `""` for a
/// session with no backlog).
pub fn decode_payload(text: &str) -> Result<Vec<u8>, CodecError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    Ok(STANDARD.decode(text)?)
}
