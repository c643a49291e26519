//! Client-side error type. Wraps the crate-wide [`ChatError`] with the
//! handful of failure modes specific to driving the mirror state machine
//! from the client's side of the wire.

use thiserror::Error;

use crate::error::ChatError;

#[derive(Debug, Error)]
pub enum ChatClientError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected packet: expected {expected}, got {actual}")]
    UnexpectedPacket { expected: String, actual: String },

    #[error("connection closed unexpectedly")]
    ConnectionClosed,

    #[error("not registered yet")]
    NotRegistered,
}

pub type ChatClientResult<T> = Result<T, ChatClientError>;
