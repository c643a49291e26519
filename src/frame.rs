//! The wire-level frame envelope: `u8 type | u32 big-endian length | bytes[length]`.
//!
//! A [`RawFrame`] is the unit the rest of the crate works with once a connection
//! has pulled enough bytes off the socket. Parsing follows the same two-phase
//! `check`/`parse` split used throughout this codebase's PDU history: `check`
//! inspects a `Cursor` without consuming anything so a caller can tell whether a
//! full frame is buffered yet, and `parse` performs the actual decode once
//! `check` has returned `Ok`.

use bytes::{Buf, Bytes, BytesMut};
use std::fmt;
use std::io::Cursor;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// The four reserved frame type tags. Only `Json` and `FileChunk` are live;
/// `FileControl` and `Heartbeat` are reserved wire values with no current
/// producer or consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Json,
    FileChunk,
    FileControl,
    Heartbeat,
}

impl FrameType {
    pub const fn tag(self) -> u8 {
        match self {
            FrameType::Json => 0x01,
            FrameType::FileChunk => 0x02,
            FrameType::FileControl => 0x03,
            FrameType::Heartbeat => 0x04,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(FrameType::Json),
            0x02 => Some(FrameType::FileChunk),
            0x03 => Some(FrameType::FileControl),
            0x04 => Some(FrameType::Heartbeat),
            _ => None,
        }
    }
}

/// A decoded frame: its type tag and the raw payload bytes.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub frame_type: FrameType,
    pub payload: Bytes,
}

/// Errors that arise while parsing the frame envelope itself. Distinct from
/// [`crate::codec::CodecError`], which operates one layer up on the payload.
#[derive(Debug)]
pub enum Error {
    /// Not enough data buffered yet; the caller should read more and retry.
    Incomplete,
    /// The frame header was well-formed for buffering purposes but invalid
    /// (unknown type tag, unreasonable length).
    Protocol(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Incomplete => write!(f, "incomplete frame"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

const HEADER_LEN: usize = 1 + 4;
// u32 lengths are non-negative by construction; anything past this bound
// can never legitimately be buffered in memory and is rejected outright
// rather than waited on forever.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Checks whether `src` currently holds at least one complete frame, without
/// consuming anything.
pub fn check(src: &Cursor<&[u8]>) -> Result<(), Error> {
    if src.remaining() < HEADER_LEN {
        return Err(Error::Incomplete);
    }

    let tag = peek_u8(src);
    if FrameType::from_tag(tag).is_none() {
        return Err(Error::Protocol(format!("unknown frame type {tag:#04x}")));
    }

    let len = peek_u32_at(src, 1);
    if len > MAX_FRAME_LEN {
        return Err(Error::Protocol(format!("frame length {len} exceeds sane bound")));
    }

    if src.remaining() < HEADER_LEN + len as usize {
        return Err(Error::Incomplete);
    }

    Ok(())
}

/// Parses one frame out of `src`. Callers must have already called
/// [`check`] successfully against the same bytes.
pub fn parse(src: &mut Cursor<&[u8]>) -> Result<RawFrame, Error> {
    let tag = src.get_u8();
    let frame_type = FrameType::from_tag(tag)
        .ok_or_else(|| Error::Protocol(format!("unknown frame type {tag:#04x}")))?;
    let len = src.get_u32() as usize;

    let start = src.position() as usize;
    let end = start + len;
    let payload = Bytes::copy_from_slice(&src.get_ref()[start..end]);
    src.set_position(end as u64);

    Ok(RawFrame { frame_type, payload })
}

/// Writes one frame as a single unit: type byte, big-endian length, payload,
/// then flush. Callers are responsible for ensuring only one task ever calls
/// this against a given socket at a time (the single-writer discipline lives
/// in [`crate::connection`], not here).
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame_type: FrameType,
    payload: &[u8],
) -> std::io::Result<()> {
    writer.write_u8(frame_type.tag()).await?;
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

fn peek_u8(src: &Cursor<&[u8]>) -> u8 {
    src.get_ref()[src.position() as usize]
}

fn peek_u32_at(src: &Cursor<&[u8]>, offset: usize) -> u32 {
    let base = src.position() as usize + offset;
    let bytes = &src.get_ref()[base..base + 4];
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Pulls one complete frame out of `buffer` if present, advancing past the
/// consumed bytes and leaving any trailing partial frame for the next read.
/// Used by [`crate::connection::Connection::read_frame`].
pub fn try_parse_one(buffer: &mut BytesMut) -> Result<Option<RawFrame>, Error> {
    let mut cursor = Cursor::new(&buffer[..]);
    match check(&cursor) {
        Ok(()) => {
            let frame = parse(&mut cursor)?;
            let consumed = cursor.position() as usize;
            buffer.advance(consumed);
            Ok(Some(frame))
        }
        Err(Error::Incomplete) => Ok(None),
        Err(e) => Err(e),
    }
}
