//! The binary `FILE_CHUNK` frame payload.
//!
//! Wire layout: `u16 transferId-utf8-length | utf8 transferId | u32 seq |
//! u32 chunkLen | bytes[chunkLen]`. Unlike control packets this is never
//! routed through `serde_json` — the relay only needs to peek the
//! `transferId` prefix and otherwise treats the payload as an opaque blob to
//! be forwarded byte-for-byte (`Session`'s raw-chunk relay never constructs
//! a `FileChunk`, it just reads the `transferId` and re-enqueues the
//! original `Bytes`).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ChatError, ChatResult};

#[derive(Debug, Clone)]
pub struct FileChunk {
    pub transfer_id: String,
    pub seq: u32,
    pub data: Bytes,
}

impl FileChunk {
    pub fn encode(&self) -> Bytes {
        let id_bytes = self.transfer_id.as_bytes();
        let mut buf = BytesMut::with_capacity(2 + id_bytes.len() + 4 + 4 + self.data.len());
        buf.put_u16(id_bytes.len() as u16);
        buf.put_slice(id_bytes);
        buf.put_u32(self.seq);
        buf.put_u32(self.data.len() as u32);
        buf.put_slice(&self.data);
        buf.freeze()
    }

    pub fn decode(mut payload: Bytes) -> ChatResult<Self> {
        if payload.remaining() < 2 {
            return Err(ChatError::Protocol("file chunk missing transferId length".into()));
        }
        let id_len = payload.get_u16() as usize;
        if payload.remaining() < id_len {
            return Err(ChatError::Protocol("file chunk transferId truncated".into()));
        }
        let id_bytes = payload.split_to(id_len);
        let transfer_id = String::from_utf8(id_bytes.to_vec())
            .map_err(|_| ChatError::Protocol("file chunk transferId not utf8".into()))?;

        if payload.remaining() < 8 {
            return Err(ChatError::Protocol("file chunk header truncated".into()));
        }
        let seq = payload.get_u32();
        let len = payload.get_u32() as usize;
        if payload.remaining() < len {
            return Err(ChatError::Protocol("file chunk data truncated".into()));
        }
        let data = payload.split_to(len);

        Ok(FileChunk { transfer_id, seq, data })
    }

    /// Reads just the `transferId` out of a raw chunk payload without
    /// decoding the rest. This is what the relay path on the server uses —
    /// it never needs `seq`/`data`, only where to route the frame.
    pub fn peek_transfer_id(payload: &[u8]) -> ChatResult<&str> {
        if payload.len() < 2 {
            return Err(ChatError::Protocol("file chunk missing transferId length".into()));
        }
        let id_len = u16::from_be_bytes([payload[0], payload[1]]) as usize;
        if payload.len() < 2 + id_len {
            return Err(ChatError::Protocol("file chunk transferId truncated".into()));
        }
        std::str::from_utf8(&payload[2..2 + id_len])
            .map_err(|_| ChatError::Protocol("file chunk transferId not utf8".into()))
    }
}
