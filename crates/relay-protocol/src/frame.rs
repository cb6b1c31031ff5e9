//! Wire format for multiplexed binary stream frames.
//!
//! Each binary WebSocket message is one frame:
//! - 1 byte: stream id length `L`
//! - `L` bytes: stream id (UTF-8)
//! - remaining bytes: opaque payload, forwarded verbatim
//!
//! This channel is one-way push traffic; a frame that fails to parse is
//! logged and dropped by the caller, never answered.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Maximum size of a single WebSocket message. Large enough for full video
/// keyframes.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// A parsed stream frame. `payload` is a zero-copy slice of the original
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub stream_id: String,
    pub payload: Bytes,
}

/// Binary frame header parse/encode failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("frame truncated: header declares {need} id bytes, {have} available")]
    Truncated { need: usize, have: usize },

    #[error("stream id is not valid UTF-8")]
    InvalidStreamId,

    #[error("stream id too long: {0} bytes (max 255)")]
    IdTooLong(usize),
}

/// Encode a frame for a stream. Fails only if the id does not fit the
/// single-byte length prefix.
pub fn encode_frame(stream_id: &str, payload: &[u8]) -> Result<Bytes, FrameError> {
    let id_bytes = stream_id.as_bytes();
    if id_bytes.len() > u8::MAX as usize {
        return Err(FrameError::IdTooLong(id_bytes.len()));
    }

    let mut buf = BytesMut::with_capacity(1 + id_bytes.len() + payload.len());
    buf.put_u8(id_bytes.len() as u8);
    buf.put_slice(id_bytes);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Parse a frame, resolving the stream id and slicing out the payload.
pub fn parse_frame(data: &Bytes) -> Result<StreamFrame, FrameError> {
    if data.is_empty() {
        return Err(FrameError::Empty);
    }

    let id_len = data[0] as usize;
    if data.len() < 1 + id_len {
        return Err(FrameError::Truncated {
            need: id_len,
            have: data.len() - 1,
        });
    }

    let stream_id = std::str::from_utf8(&data[1..1 + id_len])
        .map_err(|_| FrameError::InvalidStreamId)?
        .to_string();

    Ok(StreamFrame {
        stream_id,
        payload: data.slice(1 + id_len..),
    })
}
