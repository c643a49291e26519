//! Per-socket connection: a synchronous-feeling read side plus the
//! single-writer discipline that makes concurrent producers safe.
//!
//! The read half lives on whatever task calls [`Connection::read_frame`]
//! (normally a `Session`'s own task — see `session.rs`). The write half is
//! handed to a dedicated writer task the moment the `Connection` is built;
//! from then on nobody else ever touches the socket's output. Producers
//! (the owning `Session`, or any other `Session` relaying a broadcast or a
//! file chunk) only ever see the cloneable [`OutboundHandle`].

use std::time::Duration;

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};

use crate::error::{ChatError, ChatResult};
use crate::frame::{self, FrameType, RawFrame};
use tokio::io::AsyncWriteExt as _;

/// Outbound queue capacity (§6 Defaults: 256 entries).
pub const QUEUE_CAPACITY: usize = 256;
/// Backpressure timeout on enqueue (§6 Defaults: 3 s).
pub const BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(3);

/// The read side of one socket, plus a handle to enqueue outbound frames.
pub struct Connection {
    read_half: OwnedReadHalf,
    buffer: BytesMut,
    outbound: OutboundHandle,
}

/// Cloneable handle producers use to enqueue frames without ever touching
/// the socket directly. Dropping every clone of a Connection's handle
/// closes the channel, which ends the writer task and closes the socket.
#[derive(Clone)]
pub struct OutboundHandle {
    tx: mpsc::Sender<(FrameType, Bytes)>,
    closed: Arc<Notify>,
}

impl OutboundHandle {
    async fn enqueue(&self, frame_type: FrameType, payload: Bytes) -> ChatResult<()> {
        match self.tx.send_timeout((frame_type, payload), BACKPRESSURE_TIMEOUT).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => Err(ChatError::Backpressure),
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                Err(ChatError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "connection closed",
                )))
            }
        }
    }

    /// Enqueues a JSON control packet for delivery.
    pub async fn send_packet(&self, packet: &crate::codec::Packet) -> ChatResult<()> {
        let encoded = packet.encode()?;
        self.enqueue(FrameType::Json, Bytes::from(encoded)).await
    }

    /// Enqueues a structured file chunk (used by the client when streaming
    /// a file it owns; the server relay uses `send_raw_chunk` instead since
    /// it never reconstructs the chunk, only forwards the bytes).
    pub async fn send_file_chunk(&self, chunk: &crate::filechunk::FileChunk) -> ChatResult<()> {
        self.enqueue(FrameType::FileChunk, chunk.encode()).await
    }

    /// Enqueues a raw `FILE_CHUNK` payload unmodified. This is what the
    /// server's relay path uses: it never decodes the chunk beyond peeking
    /// the `transferId`, so it never needs to re-encode it either.
    pub async fn send_raw_chunk(&self, payload: Bytes) -> ChatResult<()> {
        self.enqueue(FrameType::FileChunk, payload).await
    }

    /// Forces the writer task to stop and the socket to close, even if
    /// other clones of this handle are still held elsewhere (e.g. by the
    /// Registry on behalf of other Sessions). Used when a peer is deemed
    /// unhealthy, e.g. on `BACKPRESSURE` (§7: "treat that peer's connection
    /// as unhealthy; close it").
    ///
    /// Uses `notify_one`, not `notify_waiters`: the writer task only has a
    /// `closed.notified()` future registered while it is parked in its
    /// `select!`, not while it is off awaiting `write_frame` on a slow
    /// socket. `notify_one` stores a permit when nobody is currently
    /// waiting, so a `close()` landing mid-write is not lost — the writer's
    /// next `notified().await` consumes it immediately instead of blocking.
    pub fn close(&self) {
        self.closed.notify_one();
    }
}

impl Connection {
    /// Splits the socket and spawns the writer task. Returns the
    /// `Connection` (read side) and a cloneable `OutboundHandle` the caller
    /// can hand out to the Registry for other sessions to enqueue into.
    pub fn new(socket: TcpStream) -> (Self, OutboundHandle) {
        let (read_half, write_half) = socket.into_split();
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let closed = Arc::new(Notify::new());
        let outbound = OutboundHandle { tx, closed: closed.clone() };

        tokio::spawn(writer_loop(write_half, rx, closed));

        (
            Connection {
                read_half,
                buffer: BytesMut::with_capacity(8 * 1024),
                outbound: outbound.clone(),
            },
            outbound,
        )
    }

    /// Returns a clone of this connection's outbound handle, for the owning
    /// Session to hand to the Registry.
    pub fn outbound(&self) -> OutboundHandle {
        self.outbound.clone()
    }

    /// Blocks until a full frame is available, EOF is reached, or an error
    /// occurs: try to parse what's already buffered first, only then read
    /// more off the socket.
    pub async fn read_frame(&mut self) -> ChatResult<Option<RawFrame>> {
        use tokio::io::AsyncReadExt;

        loop {
            if let Some(frame) = frame::try_parse_one(&mut self.buffer)? {
                return Ok(Some(frame));
            }

            let n = self.read_half.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(ChatError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed mid-frame",
                    )))
                };
            }
        }
    }
}

async fn writer_loop(
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::Receiver<(FrameType, Bytes)>,
    closed: Arc<Notify>,
) {
    loop {
        tokio::select! {
            biased;
            _ = closed.notified() => break,
            next = rx.recv() => {
                match next {
                    Some((frame_type, payload)) => {
                        if let Err(err) = frame::write_frame(&mut write_half, frame_type, &payload).await {
                            tracing::warn!(error = %err, "writer task failed, closing connection");
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
    let _ = write_half.shutdown().await;
}
