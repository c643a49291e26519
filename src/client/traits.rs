//! Client-side trait layer, mirroring the server's state machine.
//!
//! Connection lifecycle is split from protocol operations: `ChatConnection`
//! owns the socket lifecycle, `ChatClient` extends it with the
//! register/chat/whisper/file operations a caller actually drives a
//! session with.

use std::future::Future;
use std::path::Path;

use tokio::net::ToSocketAddrs;

use crate::client::error::ChatClientResult;
use crate::client::types::ClientEvent;

/// Base connection lifecycle, independent of anything chat-specific.
pub trait ChatConnection {
    /// Connects to a server and starts the background reader task.
    fn connect<T: ToSocketAddrs + Send>(addr: T) -> impl Future<Output = ChatClientResult<Self>> + Send
    where
        Self: Sized;

    /// Sends `DISCONNECT_REQUEST` and closes the connection.
    fn disconnect(&mut self) -> impl Future<Output = ChatClientResult<()>> + Send;

    /// True while the connection's writer task is still reachable.
    fn is_connected(&self) -> bool;
}

/// The chat-specific operations a client session exposes, each a thin
/// wrapper that builds the matching `Packet` and enqueues it for send.
/// The server is authoritative for every outcome; these calls only enqueue
/// the request; results arrive asynchronously through [`ChatClient::next_event`].
pub trait ChatClient: ChatConnection {
    /// Sends `REGISTER_NAME{name}`.
    fn register(&mut self, name: impl Into<String> + Send) -> impl Future<Output = ChatClientResult<()>> + Send;

    /// Sends `UPDATE_NAME{newName}`.
    fn update_name(
        &mut self,
        new_name: impl Into<String> + Send,
    ) -> impl Future<Output = ChatClientResult<()>> + Send;

    /// Sends `CHAT_MESSAGE{"", message}` (the server rewrites `sender`).
    fn send_chat(&mut self, message: impl Into<String> + Send) -> impl Future<Output = ChatClientResult<()>> + Send;

    /// Sends `WHISPER{"", target, message}`.
    fn whisper(
        &mut self,
        target: impl Into<String> + Send,
        message: impl Into<String> + Send,
    ) -> impl Future<Output = ChatClientResult<()>> + Send;

    /// Streams a file to `target`: `FILE_SEND_REQUEST`, then fixed-size
    /// `FILE_CHUNK` frames, then `FILE_SEND_COMPLETE` (§4.6).
    fn send_file(
        &mut self,
        target: impl Into<String> + Send,
        path: impl AsRef<Path> + Send,
    ) -> impl Future<Output = ChatClientResult<()>> + Send;

    /// Sends `DISCONNECT_REQUEST{}` without tearing down the socket itself
    /// (the server's own close, observed as EOF, does that).
    fn disconnect_request(&mut self) -> impl Future<Output = ChatClientResult<()>> + Send;

    /// Awaits the next event surfaced by the background reader, or `None`
    /// once the connection has closed and no more events will arrive.
    fn next_event(&mut self) -> impl Future<Output = Option<ClientEvent>> + Send;

    /// True once `REGISTER_NAME_SUCCESS` has been observed.
    fn is_registered(&self) -> bool;

    /// The locally-known display name, if registered.
    fn name(&self) -> Option<String>;

    /// The server-assigned client id, once `CONNECT_SUCCESS` or
    /// `REGISTER_NAME_SUCCESS` has revealed it.
    fn id(&self) -> Option<String>;
}
