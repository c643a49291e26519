//! Supporting types for the client-side mirror state machine: the local
//! command grammar (§6 CLI), the events a `ChatClient` surfaces to whatever
//! renders them, and the per-transfer receive-side bookkeeping.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;

/// The default directory incoming files are written into (§6 Defaults).
pub const DEFAULT_DOWNLOADS_DIR: &str = "./downloads";

/// Default chunk size used when streaming an outgoing file (§6 Defaults: 64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A user command, parsed from one line of input. Mirrors §4.6/§6's
/// grammar: first token of the line decides the shape; everything else is
/// plain chat. `/n <name>` covers both initial registration and rename —
/// the caller (the thing holding a `ChatClient`) decides which packet to
/// send based on whether it is already registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetName(String),
    Whisper { target: String, message: String },
    SendFile { target: String, path: String },
    Chat(String),
    Exit,
}

/// Parses one line of user input into a [`Command`]. Purely local,
/// best-effort validation; the server is always the authority (§4.6).
pub fn parse_command(line: &str) -> Command {
    let line = line.trim_end_matches(['\r', '\n']);

    if line == "exit" {
        return Command::Exit;
    }
    if let Some(rest) = line.strip_prefix("/n ") {
        return Command::SetName(rest.trim().to_string());
    }
    if let Some(rest) = line.strip_prefix("/w ") {
        return match rest.split_once(' ') {
            Some((target, message)) => {
                Command::Whisper { target: target.to_string(), message: message.to_string() }
            }
            None => Command::Whisper { target: rest.trim().to_string(), message: String::new() },
        };
    }
    if let Some(rest) = line.strip_prefix("/f ") {
        return match rest.split_once(' ') {
            Some((target, path)) => {
                Command::SendFile { target: target.to_string(), path: path.to_string() }
            }
            None => Command::SendFile { target: rest.trim().to_string(), path: String::new() },
        };
    }
    Command::Chat(line.to_string())
}

/// Events the client's background reader surfaces to the caller, one per
/// decoded frame that matters to an application (rendering them is an
/// external concern; this is the interface it consumes).
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected(String),
    Registered { id: String, name: String },
    NameBlank(String),
    NameDuplicated(String),
    UserEntered { id: String, name: String },
    Chat { sender: String, message: String },
    ServerInfo(String),
    Renamed { old_name: String, new_name: String },
    UserNotExists(String),
    WhisperReceived { sender: String, target: String, message: String },
    WhisperSent { sender: String, target: String, message: String },
    Disconnected { target: String, sent: u64, received: u64 },
    IncomingFileStarted { transfer_id: String, file_name: String, size: u64 },
    IncomingFileComplete { transfer_id: String, file_name: String },
}

/// Receive-side bookkeeping for one in-progress inbound file transfer,
/// keyed by `transferId` in the client's reader loop. Closed on
/// `FILE_SEND_COMPLETE` or as soon as `received >= expected_size` (§4.6),
/// whichever happens first.
pub struct IncomingTransfer {
    pub file_name: String,
    pub expected_size: u64,
    pub received: u64,
    file: tokio::fs::File,
}

impl IncomingTransfer {
    pub async fn create(
        downloads_dir: &Path,
        file_name: &str,
        expected_size: u64,
    ) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(downloads_dir).await?;
        let file = tokio::fs::File::create(downloads_dir.join(file_name)).await?;
        Ok(IncomingTransfer { file_name: file_name.to_string(), expected_size, received: 0, file })
    }

    pub async fn write_chunk(&mut self, data: &Bytes) -> std::io::Result<()> {
        self.file.write_all(data).await?;
        self.received += data.len() as u64;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.received >= self.expected_size
    }
}

pub type IncomingTransfers = HashMap<String, IncomingTransfer>;

/// Resolves the downloads directory a client should write into, falling
/// back to [`DEFAULT_DOWNLOADS_DIR`] when the caller doesn't override it.
pub fn downloads_dir(override_dir: Option<PathBuf>) -> PathBuf {
    override_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOADS_DIR))
}
