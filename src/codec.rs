//! JSON control-packet codec.
//!
//! A `Packet` is the decoded form of a `JSON_PACKET` frame's payload. On the
//! wire the payload is `u32 length | u32 typeCode | utf8-json bytes`, where
//! `length = 8 + body.len()`. This module owns that envelope plus the
//! per-DTO (de)serialization; it never touches sockets or frame tags.
//!
//! Unknown `typeCode` values fail decode as [`CodecError::UnknownType`].
//! Unknown JSON object keys inside a body are tolerated by `serde_json`
//! without any extra work here — only missing/mistyped required fields fail.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// The closed set of wire type codes. Values are fixed by the protocol and
/// must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum PacketType {
    ConnectSuccess = 1,
    RegisterName = 10,
    RegisterNameSuccess = 11,
    NameCannotBeBlank = 12,
    NameCannotBeDuplicated = 13,
    UserEntered = 19,
    ChatMessage = 20,
    ServerInfo = 30,
    UpdateName = 33,
    UpdateNameSuccess = 34,
    DisconnectInfo = 40,
    DisconnectRequest = 41,
    Whisper = 50,
    UserNotExists = 51,
    WhisperToSender = 52,
    WhisperToTarget = 53,
    FileSendRequest = 60,
    FileSendComplete = 61,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unknown packet type code {0}")]
    UnknownType(i32),
    #[error("malformed json body: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("truncated packet payload")]
    Truncated,
}

// --- Body DTOs, one per live PacketType, field names matching the wire table verbatim. ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectSuccess {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterName {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterNameSuccess {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameCannotBeBlank {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameCannotBeDuplicated {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntered {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateName {
    #[serde(rename = "newName")]
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNameSuccess {
    #[serde(rename = "oldName")]
    pub old_name: String,
    #[serde(rename = "newName")]
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectInfo {
    pub target: String,
    pub sent: u64,
    pub received: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DisconnectRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Whisper {
    pub sender: String,
    pub target: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserNotExists {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperToSender {
    pub sender: String,
    pub target: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperToTarget {
    pub sender: String,
    pub target: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSendRequest {
    pub target: String,
    #[serde(rename = "transferId")]
    pub transfer_id: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "fileSize")]
    pub file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSendComplete {
    #[serde(rename = "transferId")]
    pub transfer_id: String,
}

/// A decoded control packet: the closed set of every live message in the
/// protocol. Encoding/decoding goes through this enum rather than raw JSON so
/// that `Session`/`DefaultClient` dispatch is one `match`, not a parse-then-
/// match-on-string-field dance.
#[derive(Debug, Clone)]
pub enum Packet {
    ConnectSuccess(ConnectSuccess),
    RegisterName(RegisterName),
    RegisterNameSuccess(RegisterNameSuccess),
    NameCannotBeBlank(NameCannotBeBlank),
    NameCannotBeDuplicated(NameCannotBeDuplicated),
    UserEntered(UserEntered),
    ChatMessage(ChatMessage),
    ServerInfo(ServerInfo),
    UpdateName(UpdateName),
    UpdateNameSuccess(UpdateNameSuccess),
    DisconnectInfo(DisconnectInfo),
    DisconnectRequest(DisconnectRequest),
    Whisper(Whisper),
    UserNotExists(UserNotExists),
    WhisperToSender(WhisperToSender),
    WhisperToTarget(WhisperToTarget),
    FileSendRequest(FileSendRequest),
    FileSendComplete(FileSendComplete),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::ConnectSuccess(_) => PacketType::ConnectSuccess,
            Packet::RegisterName(_) => PacketType::RegisterName,
            Packet::RegisterNameSuccess(_) => PacketType::RegisterNameSuccess,
            Packet::NameCannotBeBlank(_) => PacketType::NameCannotBeBlank,
            Packet::NameCannotBeDuplicated(_) => PacketType::NameCannotBeDuplicated,
            Packet::UserEntered(_) => PacketType::UserEntered,
            Packet::ChatMessage(_) => PacketType::ChatMessage,
            Packet::ServerInfo(_) => PacketType::ServerInfo,
            Packet::UpdateName(_) => PacketType::UpdateName,
            Packet::UpdateNameSuccess(_) => PacketType::UpdateNameSuccess,
            Packet::DisconnectInfo(_) => PacketType::DisconnectInfo,
            Packet::DisconnectRequest(_) => PacketType::DisconnectRequest,
            Packet::Whisper(_) => PacketType::Whisper,
            Packet::UserNotExists(_) => PacketType::UserNotExists,
            Packet::WhisperToSender(_) => PacketType::WhisperToSender,
            Packet::WhisperToTarget(_) => PacketType::WhisperToTarget,
            Packet::FileSendRequest(_) => PacketType::FileSendRequest,
            Packet::FileSendComplete(_) => PacketType::FileSendComplete,
        }
    }

    fn body_json(&self) -> Result<Vec<u8>, CodecError> {
        let bytes = match self {
            Packet::ConnectSuccess(b) => serde_json::to_vec(b)?,
            Packet::RegisterName(b) => serde_json::to_vec(b)?,
            Packet::RegisterNameSuccess(b) => serde_json::to_vec(b)?,
            Packet::NameCannotBeBlank(b) => serde_json::to_vec(b)?,
            Packet::NameCannotBeDuplicated(b) => serde_json::to_vec(b)?,
            Packet::UserEntered(b) => serde_json::to_vec(b)?,
            Packet::ChatMessage(b) => serde_json::to_vec(b)?,
            Packet::ServerInfo(b) => serde_json::to_vec(b)?,
            Packet::UpdateName(b) => serde_json::to_vec(b)?,
            Packet::UpdateNameSuccess(b) => serde_json::to_vec(b)?,
            Packet::DisconnectInfo(b) => serde_json::to_vec(b)?,
            Packet::DisconnectRequest(b) => serde_json::to_vec(b)?,
            Packet::Whisper(b) => serde_json::to_vec(b)?,
            Packet::UserNotExists(b) => serde_json::to_vec(b)?,
            Packet::WhisperToSender(b) => serde_json::to_vec(b)?,
            Packet::WhisperToTarget(b) => serde_json::to_vec(b)?,
            Packet::FileSendRequest(b) => serde_json::to_vec(b)?,
            Packet::FileSendComplete(b) => serde_json::to_vec(b)?,
        };
        Ok(bytes)
    }

    /// Encodes to the `u32 length | u32 typeCode | json` payload that goes
    /// inside a `JSON_PACKET` frame.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let body = self.body_json()?;
        let type_code: i32 = self.packet_type().into();
        let length = 8 + body.len() as u32;

        let mut out = Vec::with_capacity(8 + body.len());
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&type_code.to_be_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decodes a `JSON_PACKET` frame payload back into a `Packet`.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        if payload.len() < 8 {
            return Err(CodecError::Truncated);
        }
        let type_code = i32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let body = &payload[8..];

        let packet_type = PacketType::try_from(type_code)
            .map_err(|_| CodecError::UnknownType(type_code))?;

        Ok(match packet_type {
            PacketType::ConnectSuccess => Packet::ConnectSuccess(serde_json::from_slice(body)?),
            PacketType::RegisterName => Packet::RegisterName(serde_json::from_slice(body)?),
            PacketType::RegisterNameSuccess => {
                Packet::RegisterNameSuccess(serde_json::from_slice(body)?)
            }
            PacketType::NameCannotBeBlank => {
                Packet::NameCannotBeBlank(serde_json::from_slice(body)?)
            }
            PacketType::NameCannotBeDuplicated => {
                Packet::NameCannotBeDuplicated(serde_json::from_slice(body)?)
            }
            PacketType::UserEntered => Packet::UserEntered(serde_json::from_slice(body)?),
            PacketType::ChatMessage => Packet::ChatMessage(serde_json::from_slice(body)?),
            PacketType::ServerInfo => Packet::ServerInfo(serde_json::from_slice(body)?),
            PacketType::UpdateName => Packet::UpdateName(serde_json::from_slice(body)?),
            PacketType::UpdateNameSuccess => {
                Packet::UpdateNameSuccess(serde_json::from_slice(body)?)
            }
            PacketType::DisconnectInfo => Packet::DisconnectInfo(serde_json::from_slice(body)?),
            PacketType::DisconnectRequest => {
                Packet::DisconnectRequest(if body.is_empty() {
                    DisconnectRequest::default()
                } else {
                    serde_json::from_slice(body)?
                })
            }
            PacketType::Whisper => Packet::Whisper(serde_json::from_slice(body)?),
            PacketType::UserNotExists => Packet::UserNotExists(serde_json::from_slice(body)?),
            PacketType::WhisperToSender => {
                Packet::WhisperToSender(serde_json::from_slice(body)?)
            }
            PacketType::WhisperToTarget => {
                Packet::WhisperToTarget(serde_json::from_slice(body)?)
            }
            PacketType::FileSendRequest => {
                Packet::FileSendRequest(serde_json::from_slice(body)?)
            }
            PacketType::FileSendComplete => {
                Packet::FileSendComplete(serde_json::from_slice(body)?)
            }
        })
    }
}
