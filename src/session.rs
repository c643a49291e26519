//! The server-side per-client state machine.
//!
//! One `Session` is spawned per accepted connection and owns that
//! connection's `Connection` (read side) and `OutboundHandle` (write side)
//! exclusively. It registers itself in the shared `Registry` on entry and
//! removes itself on the way out; in between it is the only place chat
//! fan-out, whisper routing, and file-chunk relaying happen.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::codec::{
    ChatMessage, ConnectSuccess, DisconnectInfo, FileSendComplete, FileSendRequest,
    NameCannotBeBlank, NameCannotBeDuplicated, Packet, RegisterNameSuccess, UpdateNameSuccess,
    UserEntered, UserNotExists, WhisperToSender, WhisperToTarget,
};
use crate::connection::{Connection, OutboundHandle};
use crate::error::{ChatError, ChatResult};
use crate::filechunk::FileChunk;
use crate::frame::FrameType;
use crate::registry::{ClientData, ClientId, Registry, SessionHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unnamed,
    Named,
    Closing,
}

/// True if `name` is blank per §4.5: empty after trimming leading/trailing
/// whitespace. The raw, untrimmed string is what actually gets stored and
/// compared for uniqueness — "no further normalization" per spec.
fn is_blank_name(name: &str) -> bool {
    name.trim().is_empty()
}

pub struct Session {
    id: ClientId,
    connection: Connection,
    outbound: OutboundHandle,
    data: Arc<ClientData>,
    registry: Arc<Registry>,
    state: State,
    /// Sender-side transfer table: `transferId -> target client id`.
    /// Exclusively owned by this Session's own task; never shared.
    transfers: HashMap<String, ClientId>,
}

impl Session {
    pub fn new(socket: TcpStream, registry: Arc<Registry>) -> Self {
        let id = Uuid::new_v4().to_string();
        let (connection, outbound) = Connection::new(socket);
        let data = Arc::new(ClientData::new(id.clone()));

        Session {
            id,
            connection,
            outbound,
            data,
            registry,
            state: State::Unnamed,
            transfers: HashMap::new(),
        }
    }

    /// Runs the session to completion: registers, dispatches frames until
    /// the connection closes or a fatal error occurs, then tears down. This
    /// function never returns early without reaching teardown — registry
    /// removal and connection close happen exactly once regardless of which
    /// branch of the dispatch ended the loop.
    #[tracing::instrument(skip(self), fields(client_id = %self.id))]
    pub async fn run(mut self) {
        let handle = Arc::new(SessionHandle {
            data: self.data.clone(),
            outbound: self.outbound.clone(),
        });
        self.registry.add(self.id.clone(), handle);
        tracing::info!("client connected");

        if let Err(err) = self
            .outbound
            .send_packet(&Packet::ConnectSuccess(ConnectSuccess {
                message: "welcome".into(),
            }))
            .await
        {
            tracing::warn!(error = %err, "failed to send CONNECT_SUCCESS");
        }

        if let Err(err) = self.dispatch_loop().await {
            tracing::warn!(error = %err, "session terminated");
        }

        self.teardown().await;
    }

    async fn dispatch_loop(&mut self) -> ChatResult<()> {
        loop {
            if self.state == State::Closing {
                return Ok(());
            }

            let frame = match self.connection.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(err) => return Err(err),
            };

            match frame.frame_type {
                FrameType::Json => {
                    let packet = Packet::decode(&frame.payload)?;
                    self.handle_packet(packet).await?;
                }
                FrameType::FileChunk => {
                    self.relay_file_chunk(frame.payload).await;
                }
                FrameType::FileControl | FrameType::Heartbeat => {
                    tracing::debug!("ignoring reserved frame type with no live consumer");
                }
            }
        }
    }

    async fn handle_packet(&mut self, packet: Packet) -> ChatResult<()> {
        match packet {
            Packet::RegisterName(body) => self.handle_register_name(body.name).await,
            Packet::UpdateName(body) => self.handle_update_name(body.new_name).await,
            Packet::DisconnectRequest(_) => {
                self.state = State::Closing;
                Ok(())
            }
            Packet::ChatMessage(body) => self.handle_chat_message(body.message).await,
            Packet::Whisper(body) => self.handle_whisper(body.target, body.message).await,
            Packet::FileSendRequest(body) => self.handle_file_send_request(body).await,
            Packet::FileSendComplete(body) => {
                self.handle_file_send_complete(body.transfer_id).await
            }
            other => Err(ChatError::Protocol(format!(
                "unexpected packet type from client: {:?}",
                other.packet_type()
            ))),
        }
    }

    async fn handle_register_name(&mut self, name: String) -> ChatResult<()> {
        if self.state != State::Unnamed {
            tracing::debug!("ignoring REGISTER_NAME from an already-named client");
            return Ok(());
        }

        if is_blank_name(&name) {
            return self
                .outbound
                .send_packet(&Packet::NameCannotBeBlank(NameCannotBeBlank {
                    message: "name cannot be blank".into(),
                }))
                .await;
        }

        if !self.registry.try_set_name(&self.id, &name) {
            return self
                .outbound
                .send_packet(&Packet::NameCannotBeDuplicated(NameCannotBeDuplicated {
                    message: format!("name '{name}' is already taken"),
                }))
                .await;
        }

        self.state = State::Named;

        self.outbound
            .send_packet(&Packet::RegisterNameSuccess(RegisterNameSuccess {
                id: self.id.clone(),
                name: name.clone(),
            }))
            .await?;

        tracing::info!(name = %name, "client registered");
        self.broadcast(Packet::UserEntered(UserEntered { id: self.id.clone(), name }))
            .await;
        Ok(())
    }

    async fn handle_update_name(&mut self, new_name: String) -> ChatResult<()> {
        if self.state != State::Named {
            tracing::debug!("ignoring UPDATE_NAME from an unregistered client");
            return Ok(());
        }

        if is_blank_name(&new_name) {
            return self
                .outbound
                .send_packet(&Packet::NameCannotBeBlank(NameCannotBeBlank {
                    message: "name cannot be blank".into(),
                }))
                .await;
        }

        let old_name = self.data.name().unwrap_or_default();

        if !self.registry.try_set_name(&self.id, &new_name) {
            return self
                .outbound
                .send_packet(&Packet::NameCannotBeDuplicated(NameCannotBeDuplicated {
                    message: format!("name '{new_name}' is already taken"),
                }))
                .await;
        }

        let packet = Packet::UpdateNameSuccess(UpdateNameSuccess {
            old_name: old_name.clone(),
            new_name: new_name.clone(),
        });
        self.outbound.send_packet(&packet).await?;
        tracing::info!(old_name = %old_name, new_name = %new_name, "client renamed");
        self.broadcast(packet).await;
        Ok(())
    }

    async fn handle_chat_message(&mut self, message: String) -> ChatResult<()> {
        if self.state != State::Named {
            tracing::debug!("ignoring CHAT_MESSAGE before registration");
            return Ok(());
        }

        let sender = self.data.name().unwrap_or_default();
        self.data.incr_sent();
        self.broadcast_with_receipt(Packet::ChatMessage(ChatMessage { sender, message }))
            .await;
        Ok(())
    }

    async fn handle_whisper(&mut self, target: String, message: String) -> ChatResult<()> {
        if self.state != State::Named {
            tracing::debug!("ignoring WHISPER before registration");
            return Ok(());
        }

        let Some(peer) = self.registry.find_by_name(&target) else {
            return self
                .outbound
                .send_packet(&Packet::UserNotExists(UserNotExists {
                    message: format!("no such user '{target}'"),
                }))
                .await;
        };

        let sender = self.data.name().unwrap_or_default();
        let to_target = Packet::WhisperToTarget(WhisperToTarget {
            sender: sender.clone(),
            target: target.clone(),
            message: message.clone(),
        });
        match peer.outbound.send_packet(&to_target).await {
            Ok(()) => peer.data.incr_received(),
            Err(err) => self.close_unhealthy_peer(&peer, err),
        }

        self.data.incr_sent();
        self.outbound
            .send_packet(&Packet::WhisperToSender(WhisperToSender { sender, target, message }))
            .await
    }

    async fn handle_file_send_request(&mut self, body: FileSendRequest) -> ChatResult<()> {
        if self.state != State::Named {
            tracing::debug!("ignoring FILE_SEND_REQUEST before registration");
            return Ok(());
        }

        let Some(peer) = self.registry.find_by_name(&body.target) else {
            return self
                .outbound
                .send_packet(&Packet::UserNotExists(UserNotExists {
                    message: format!("no such user '{}'", body.target),
                }))
                .await;
        };

        self.transfers.insert(body.transfer_id.clone(), peer.data.id.clone());
        if let Err(err) = peer.outbound.send_packet(&Packet::FileSendRequest(body)).await {
            self.close_unhealthy_peer(&peer, err);
        }
        Ok(())
    }

    async fn handle_file_send_complete(&mut self, transfer_id: String) -> ChatResult<()> {
        if self.state != State::Named {
            return Ok(());
        }

        let Some(target_id) = self.transfers.remove(&transfer_id) else {
            tracing::warn!(transfer_id = %transfer_id, "FILE_SEND_COMPLETE for unknown transfer");
            return Ok(());
        };

        if let Some(peer) = self.registry.lookup(&target_id) {
            let packet = Packet::FileSendComplete(FileSendComplete { transfer_id });
            if let Err(err) = peer.outbound.send_packet(&packet).await {
                self.close_unhealthy_peer(&peer, err);
            }
        }
        Ok(())
    }

    /// Raw `FILE_CHUNK` relay: peek the `transferId` prefix, look up the
    /// recorded target, forward the payload byte-for-byte. No error reply
    /// channel exists for file chunks (§4.5), so failures are logged and
    /// dropped rather than answered.
    async fn relay_file_chunk(&mut self, payload: Bytes) {
        let transfer_id = match FileChunk::peek_transfer_id(&payload) {
            Ok(id) => id.to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed file chunk");
                return;
            }
        };

        let Some(target_id) = self.transfers.get(&transfer_id) else {
            tracing::warn!(transfer_id = %transfer_id, "dropping file chunk for unknown transfer");
            return;
        };

        let Some(peer) = self.registry.lookup(target_id) else {
            tracing::warn!(transfer_id = %transfer_id, "dropping file chunk, target no longer connected");
            return;
        };

        if let Err(err) = peer.outbound.send_raw_chunk(payload).await {
            self.close_unhealthy_peer(&peer, err);
        }
    }

    /// Broadcasts a packet to every other registered session. Per §7, a
    /// `BACKPRESSURE` failure on one peer only takes that peer down; it
    /// never aborts the broadcast or this Session.
    async fn broadcast(&self, packet: Packet) {
        for peer in self.registry.snapshot_except(&self.id) {
            if let Err(err) = peer.outbound.send_packet(&packet).await {
                self.close_unhealthy_peer(&peer, err);
            }
        }
    }

    /// Same as `broadcast`, but increments each successfully-delivered
    /// peer's `received` counter (chat fan-out only, per §4.5).
    async fn broadcast_with_receipt(&self, packet: Packet) {
        for peer in self.registry.snapshot_except(&self.id) {
            match peer.outbound.send_packet(&packet).await {
                Ok(()) => peer.data.incr_received(),
                Err(err) => self.close_unhealthy_peer(&peer, err),
            }
        }
    }

    fn close_unhealthy_peer(&self, peer: &SessionHandle, err: ChatError) {
        tracing::warn!(peer_id = %peer.data.id, error = %err, "closing unhealthy peer connection");
        peer.outbound.close();
    }

    async fn teardown(self) {
        self.registry.remove(&self.id);

        if let Some(name) = self.data.name() {
            let packet = Packet::DisconnectInfo(DisconnectInfo {
                target: name.clone(),
                sent: self.data.sent(),
                received: self.data.received(),
            });

            if let Err(err) = self.outbound.send_packet(&packet).await {
                tracing::debug!(error = %err, "best-effort self DISCONNECT_INFO failed");
            }
            for peer in self.registry.snapshot_except(&self.id) {
                if let Err(err) = peer.outbound.send_packet(&packet).await {
                    tracing::warn!(peer_id = %peer.data.id, error = %err, "failed delivering DISCONNECT_INFO");
                }
            }
            tracing::info!(
                name = %name,
                sent = self.data.sent(),
                received = self.data.received(),
                "client disconnected"
            );
        } else {
            tracing::info!("unnamed client disconnected");
        }

        self.outbound.close();
    }
}
