//! Frame codec for the session channel
//!
//! WebSocket transports carry one JSON message per text frame. Stream
//! transports (TCP, Unix sockets) use [`FrameCodec`], which delimits the
//! same JSON text with newlines. JSON never contains a raw newline, so no
//! escaping is needed.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::messages::{ClientMessage, ServerMessage};

/// Maximum frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid payload encoding: {0}")]
    Payload(#[from] base64::DecodeError),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Frame contains an embedded newline")]
    EmbeddedNewline,
}

/// Serialize a client message into a single text frame
pub fn encode_client_message(msg: &ClientMessage) -> Result<String, CodecError> {
    let text = serde_json::to_string(msg)?;
    if text.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: text.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(text)
}

/// Parse a text frame into a server message
pub fn decode_server_message(text: &str) -> Result<ServerMessage, CodecError> {
    Ok(serde_json::from_str(text)?)
}

/// Newline-delimited text frame codec
///
/// Decoding yields raw frame text; message parsing happens at dispatch so
/// that one corrupt frame never terminates the stream. Invalid UTF-8 is
/// replaced rather than rejected for the same reason.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Bytes already scanned for a newline
    next_index: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_frame(&mut self, src: &mut BytesMut, end: usize) -> String {
        let raw = src.split_to(end + 1);
        self.next_index = 0;
        let mut line = &raw[..raw.len() - 1];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        String::from_utf8_lossy(line).into_owned()
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let scan_from = self.next_index.min(src.len());
            let Some(offset) = src[scan_from..].iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_FRAME_SIZE {
                    return Err(CodecError::FrameTooLarge {
                        size: src.len(),
                        max: MAX_FRAME_SIZE,
                    });
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let frame = self.take_frame(src, scan_from + offset);
            // Blank lines are keepalive noise
            if !frame.trim().is_empty() {
                return Ok(Some(frame));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        // Unterminated trailing frame
        let len = src.len();
        src.put_u8(b'\n');
        let frame = self.take_frame(src, len);
        Ok((!frame.trim().is_empty()).then_some(frame))
    }
}

impl Encoder<String> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: item.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        if item.contains('\n') {
            return Err(CodecError::EmbeddedNewline);
        }

        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
