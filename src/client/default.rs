//! The default client implementation: a background reader task that
//! decodes frames and updates shared state / emits [`ClientEvent`]s, plus
//! foreground methods that enqueue outbound packets through the
//! `Connection`'s `OutboundHandle`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::client::error::{ChatClientError, ChatClientResult};
use crate::client::traits::{ChatClient, ChatConnection};
use crate::client::types::{downloads_dir, ClientEvent, IncomingTransfer, IncomingTransfers, DEFAULT_CHUNK_SIZE};
use crate::codec::{
    ChatMessage, DisconnectRequest, FileSendComplete, FileSendRequest, Packet, RegisterName,
    UpdateName, Whisper,
};
use crate::connection::{Connection, OutboundHandle};
use crate::filechunk::FileChunk;
use crate::frame::FrameType;

/// State shared between the foreground handle and the background reader
/// task. Small enough that a couple of locks are simpler than threading an
/// update channel back for every field.
struct ClientState {
    id: Mutex<Option<String>>,
    name: Mutex<Option<String>>,
    registered: AtomicBool,
}

impl ClientState {
    fn new() -> Self {
        ClientState { id: Mutex::new(None), name: Mutex::new(None), registered: AtomicBool::new(false) }
    }
}

/// The default mirror-state-machine client: one TCP connection, a
/// background reader task, and the foreground `ChatClient` operations.
pub struct DefaultClient {
    outbound: OutboundHandle,
    state: Arc<ClientState>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    reader_task: JoinHandle<()>,
    downloads_dir: PathBuf,
}

impl ChatConnection for DefaultClient {
    async fn connect<T: ToSocketAddrs + Send>(addr: T) -> ChatClientResult<Self> {
        Self::connect_to(addr, None).await
    }

    async fn disconnect(&mut self) -> ChatClientResult<()> {
        let _ = self.disconnect_request().await;
        self.outbound.close();
        self.reader_task.abort();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.reader_task.is_finished()
    }
}

impl ChatClient for DefaultClient {
    async fn register(&mut self, name: impl Into<String> + Send) -> ChatClientResult<()> {
        self.outbound
            .send_packet(&Packet::RegisterName(RegisterName { name: name.into() }))
            .await
            .map_err(ChatClientError::from)
    }

    async fn update_name(&mut self, new_name: impl Into<String> + Send) -> ChatClientResult<()> {
        self.outbound
            .send_packet(&Packet::UpdateName(UpdateName { new_name: new_name.into() }))
            .await
            .map_err(ChatClientError::from)
    }

    async fn send_chat(&mut self, message: impl Into<String> + Send) -> ChatClientResult<()> {
        self.outbound
            .send_packet(&Packet::ChatMessage(ChatMessage {
                sender: String::new(),
                message: message.into(),
            }))
            .await
            .map_err(ChatClientError::from)
    }

    async fn whisper(
        &mut self,
        target: impl Into<String> + Send,
        message: impl Into<String> + Send,
    ) -> ChatClientResult<()> {
        self.outbound
            .send_packet(&Packet::Whisper(Whisper {
                sender: String::new(),
                target: target.into(),
                message: message.into(),
            }))
            .await
            .map_err(ChatClientError::from)
    }

    async fn send_file(
        &mut self,
        target: impl Into<String> + Send,
        path: impl AsRef<std::path::Path> + Send,
    ) -> ChatClientResult<()> {
        let path = path.as_ref();
        let target = target.into();
        let metadata = tokio::fs::metadata(path).await?;
        let file_size = metadata.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let transfer_id = Uuid::new_v4().to_string();

        self.outbound
            .send_packet(&Packet::FileSendRequest(FileSendRequest {
                target,
                transfer_id: transfer_id.clone(),
                file_name,
                file_size,
            }))
            .await?;

        let mut file = tokio::fs::File::open(path).await?;
        let mut buf = vec![0u8; DEFAULT_CHUNK_SIZE];
        let mut seq: u32 = 0;
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            let chunk = FileChunk {
                transfer_id: transfer_id.clone(),
                seq,
                data: Bytes::copy_from_slice(&buf[..n]),
            };
            self.outbound.send_file_chunk(&chunk).await?;
            seq += 1;
        }

        self.outbound
            .send_packet(&Packet::FileSendComplete(FileSendComplete { transfer_id }))
            .await
            .map_err(ChatClientError::from)
    }

    async fn disconnect_request(&mut self) -> ChatClientResult<()> {
        self.outbound
            .send_packet(&Packet::DisconnectRequest(DisconnectRequest::default()))
            .await
            .map_err(ChatClientError::from)
    }

    async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    fn is_registered(&self) -> bool {
        self.state.registered.load(Ordering::Relaxed)
    }

    fn name(&self) -> Option<String> {
        self.state.name.lock().expect("client name mutex poisoned").clone()
    }

    fn id(&self) -> Option<String> {
        self.state.id.lock().expect("client id mutex poisoned").clone()
    }
}

impl DefaultClient {
    /// Connects and starts the reader task, writing any received files
    /// under `downloads_dir` (defaults to `./downloads` per §6).
    pub async fn connect_to<T: ToSocketAddrs + Send>(
        addr: T,
        downloads_dir_override: Option<PathBuf>,
    ) -> ChatClientResult<Self> {
        let socket = TcpStream::connect(addr).await.map_err(crate::error::ChatError::Io)?;
        let (connection, outbound) = Connection::new(socket);
        let state = Arc::new(ClientState::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let downloads_dir = downloads_dir(downloads_dir_override);

        let reader_task =
            tokio::spawn(reader_loop(connection, state.clone(), tx, downloads_dir.clone()));

        Ok(DefaultClient { outbound, state, events: rx, reader_task, downloads_dir })
    }

    pub fn downloads_dir(&self) -> &std::path::Path {
        &self.downloads_dir
    }
}

async fn reader_loop(
    mut connection: Connection,
    state: Arc<ClientState>,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    downloads_dir: PathBuf,
) {
    let mut transfers: IncomingTransfers = IncomingTransfers::new();

    loop {
        let frame = match connection.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "client reader task terminating");
                break;
            }
        };

        let event = match frame.frame_type {
            FrameType::Json => match Packet::decode(&frame.payload) {
                Ok(packet) => handle_packet(packet, &state, &mut transfers, &downloads_dir).await,
                Err(err) => {
                    tracing::warn!(error = %err, "dropping malformed packet");
                    None
                }
            },
            FrameType::FileChunk => match FileChunk::decode(frame.payload) {
                Ok(chunk) => apply_chunk(chunk, &mut transfers).await,
                Err(err) => {
                    tracing::warn!(error = %err, "dropping malformed file chunk");
                    None
                }
            },
            FrameType::FileControl | FrameType::Heartbeat => None,
        };

        if let Some(event) = event {
            if events_tx.send(event).is_err() {
                break;
            }
        }
    }
}

async fn handle_packet(
    packet: Packet,
    state: &ClientState,
    transfers: &mut IncomingTransfers,
    downloads_dir: &std::path::Path,
) -> Option<ClientEvent> {
    match packet {
        Packet::ConnectSuccess(body) => Some(ClientEvent::Connected(body.message)),
        Packet::RegisterNameSuccess(body) => {
            *state.id.lock().expect("client id mutex poisoned") = Some(body.id.clone());
            *state.name.lock().expect("client name mutex poisoned") = Some(body.name.clone());
            state.registered.store(true, Ordering::Relaxed);
            Some(ClientEvent::Registered { id: body.id, name: body.name })
        }
        Packet::NameCannotBeBlank(body) => Some(ClientEvent::NameBlank(body.message)),
        Packet::NameCannotBeDuplicated(body) => Some(ClientEvent::NameDuplicated(body.message)),
        Packet::UserEntered(body) => Some(ClientEvent::UserEntered { id: body.id, name: body.name }),
        Packet::ChatMessage(body) => {
            Some(ClientEvent::Chat { sender: body.sender, message: body.message })
        }
        Packet::ServerInfo(body) => Some(ClientEvent::ServerInfo(body.message)),
        Packet::UpdateNameSuccess(body) => {
            *state.name.lock().expect("client name mutex poisoned") = Some(body.new_name.clone());
            Some(ClientEvent::Renamed { old_name: body.old_name, new_name: body.new_name })
        }
        Packet::DisconnectInfo(body) => Some(ClientEvent::Disconnected {
            target: body.target,
            sent: body.sent,
            received: body.received,
        }),
        Packet::UserNotExists(body) => Some(ClientEvent::UserNotExists(body.message)),
        Packet::WhisperToSender(body) => Some(ClientEvent::WhisperSent {
            sender: body.sender,
            target: body.target,
            message: body.message,
        }),
        Packet::WhisperToTarget(body) => Some(ClientEvent::WhisperReceived {
            sender: body.sender,
            target: body.target,
            message: body.message,
        }),
        Packet::FileSendRequest(body) => {
            match IncomingTransfer::create(downloads_dir, &body.file_name, body.file_size).await {
                Ok(transfer) => {
                    transfers.insert(body.transfer_id.clone(), transfer);
                    Some(ClientEvent::IncomingFileStarted {
                        transfer_id: body.transfer_id,
                        file_name: body.file_name,
                        size: body.file_size,
                    })
                }
                Err(err) => {
                    tracing::warn!(error = %err, file = %body.file_name, "failed to open incoming file for writing");
                    None
                }
            }
        }
        Packet::FileSendComplete(body) => {
            if let Some(transfer) = transfers.remove(&body.transfer_id) {
                Some(ClientEvent::IncomingFileComplete {
                    transfer_id: body.transfer_id,
                    file_name: transfer.file_name,
                })
            } else {
                None
            }
        }
        // The remaining variants (RegisterName, UpdateName, Whisper,
        // FileSendRequest is handled above, DisconnectRequest) never arrive
        // server-to-client; a conforming server never sends them here.
        other => {
            tracing::debug!(?other, "ignoring packet not expected on the client side");
            None
        }
    }
}

async fn apply_chunk(chunk: FileChunk, transfers: &mut IncomingTransfers) -> Option<ClientEvent> {
    let Some(transfer) = transfers.get_mut(&chunk.transfer_id) else {
        tracing::warn!(transfer_id = %chunk.transfer_id, "dropping file chunk for unknown transfer");
        return None;
    };

    if let Err(err) = transfer.write_chunk(&chunk.data).await {
        tracing::warn!(error = %err, transfer_id = %chunk.transfer_id, "failed writing incoming file chunk");
        return None;
    }

    if transfer.is_complete() {
        let transfer = transfers.remove(&chunk.transfer_id)?;
        Some(ClientEvent::IncomingFileComplete {
            transfer_id: chunk.transfer_id,
            file_name: transfer.file_name,
        })
    } else {
        None
    }
}
