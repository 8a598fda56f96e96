//! Codec for encoding and decoding Ripple frames.
//!
//! The encoded format is one UTF-8 line per frame:
//!
//! ```text
//! <command> TAB <jid> TAB <payload> LF
//! ```
//!
//! The jid field is empty for `Jid::NONE`. The payload is empty or a JSON
//! quoted string. Input from browsers is never trusted: invalid UTF-8 is
//! replaced and malformed lines decode to `None` instead of an error that
//! could tear the connection down.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::command::{Command, UnknownCommand};
use crate::frames::Frame;
use crate::jid::Jid;

/// Maximum frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Line is not terminated by a newline.
    #[error("Frame is missing the trailing newline")]
    Unterminated,

    /// Fewer than two tab separators.
    #[error("Frame is missing a field separator")]
    MissingSeparator,

    /// Command token not recognised.
    #[error(transparent)]
    UnknownCommand(#[from] UnknownCommand),

    /// Quoted payload failed to unquote, or failed to quote.
    #[error("Invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Encode a frame to bytes.
///
/// # Errors
///
/// Returns an error if the frame is too large.
pub fn encode(frame: &Frame) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::with_capacity(frame.payload.len() + 24);
    encode_into(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a frame into an existing buffer.
///
/// On error nothing is appended to `buf`.
///
/// # Errors
///
/// Returns an error if the frame is too large.
pub fn encode_into(frame: &Frame, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let mut line = String::with_capacity(frame.payload.len() + 24);
    line.push_str(frame.command.as_str());
    line.push('\t');
    frame.jid.append_to(&mut line);
    line.push('\t');
    if !frame.payload.is_empty() {
        line.push_str(&serde_json::to_string(&frame.payload)?);
    }
    line.push('\n');

    if line.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(line.len()));
    }

    buf.put_slice(line.as_bytes());
    Ok(())
}

/// Decode one frame, reporting why it was rejected.
///
/// # Errors
///
/// Returns an error if the line is malformed.
pub fn try_decode(data: &[u8]) -> Result<Frame, ProtocolError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }

    let text = String::from_utf8_lossy(data);
    let line = text.strip_suffix('\n').ok_or(ProtocolError::Unterminated)?;

    let (command, rest) = line.split_once('\t').ok_or(ProtocolError::MissingSeparator)?;
    let (jid, payload) = rest.split_once('\t').ok_or(ProtocolError::MissingSeparator)?;

    let command: Command = command.parse()?;
    let payload = if payload.starts_with('"') {
        serde_json::from_str::<String>(payload)?
    } else {
        payload.to_string()
    };

    Ok(Frame {
        command,
        jid: Jid::parse(jid),
        payload,
    })
}

/// Decode one frame. Malformed input yields `None`.
#[must_use]
pub fn decode(data: &[u8]) -> Option<Frame> {
    try_decode(data).ok()
}
