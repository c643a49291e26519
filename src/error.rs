//! The crate-wide error type. Covers the five error kinds named in the
//! protocol's error handling design: `IO`, `PROTOCOL`, `VALIDATION`,
//! `NOT_FOUND`, `BACKPRESSURE`. Framer, Codec, Connection and Session all
//! funnel their failures through this one enum rather than each defining
//! their own, since a Session's dispatch loop needs to react uniformly to
//! any of them (§7: `IO`/`PROTOCOL` terminate the session, `VALIDATION`
//! replies and continues, `NOT_FOUND` replies `USER_NOT_EXISTS` or is
//! dropped, `BACKPRESSURE` closes the offending peer).

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backpressure: outbound queue full")]
    Backpressure,
}

pub type ChatResult<T> = Result<T, ChatError>;

impl From<crate::frame::Error> for ChatError {
    fn from(err: crate::frame::Error) -> Self {
        match err {
            crate::frame::Error::Incomplete => {
                ChatError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "incomplete frame"))
            }
            crate::frame::Error::Protocol(msg) => ChatError::Protocol(msg),
        }
    }
}

impl From<crate::codec::CodecError> for ChatError {
    fn from(err: crate::codec::CodecError) -> Self {
        ChatError::Protocol(err.to_string())
    }
}
