//! Frame codec for the IPC wire protocol.
//!
//! Frame format:
//! ```text
//! ┌──────────┬──────────┬────────────────────────┐
//! │ len (4B) │ type(1B) │   msgpack payload      │
//! │ u32 BE   │ u8       │                        │
//! └──────────┴──────────┴────────────────────────┘
//! ```
//! Length = sizeof(type byte) + sizeof(payload), NOT including the 4-byte prefix.

use serde_json::Value;
use std::io::{Error, ErrorKind};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Message type: request from client.
pub const MSG_REQUEST: u8 = 0x01;
/// Message type: response to client.
pub const MSG_RESPONSE: u8 = 0x02;
/// Message type: error response to client.
pub const MSG_ERROR: u8 = 0xFF;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Encode `value` as a named-field msgpack frame.
    pub fn encode(msg_type: u8, value: &Value) -> std::io::Result<Self> {
        let payload = rmp_serde::to_vec_named(value).map_err(|e| {
            tracing::error!("Msgpack encoding failed: {}", e);
            Error::new(ErrorKind::InvalidData, e.to_string())
        })?;
        Ok(Self { msg_type, payload })
    }

    /// Decode the msgpack payload.
    pub fn decode(&self) -> std::result::Result<Value, rmp_serde::decode::Error> {
        rmp_serde::from_slice(&self.payload)
    }
}

/// Read one frame. `None` on clean EOF; payloads above `max_frame_bytes`
/// are refused before allocation.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    max_frame_bytes: u32,
) -> std::io::Result<Option<Frame>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let frame_len = u32::from_be_bytes(len_buf);
    if frame_len > max_frame_bytes {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("Frame too large: {} bytes", frame_len),
        ));
    }
    if frame_len < 1 {
        return Err(Error::new(
            ErrorKind::InvalidData,
            "Frame too short: missing type byte",
        ));
    }

    let mut msg_type = [0u8; 1];
    reader.read_exact(&mut msg_type).await?;
    let mut payload = vec![0u8; frame_len as usize - 1];
    reader.read_exact(&mut payload).await?;

    Ok(Some(Frame {
        msg_type: msg_type[0],
        payload,
    }))
}

/// Write one frame and flush.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, frame: &Frame) -> std::io::Result<()> {
    let frame_len = u32::try_from(frame.payload.len() + 1)
        .map_err(|_| Error::new(ErrorKind::InvalidData, "Frame exceeds u32 length"))?;
    writer.write_all(&frame_len.to_be_bytes()).await?;
    writer.write_all(&[frame.msg_type]).await?;
    writer.write_all(&frame.payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_frame_round_trip_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let sent = Frame::encode(MSG_REQUEST, &json!({"id": "1", "service": "tools"})).unwrap();
        write_frame(&mut client, &sent).await.unwrap();
        drop(client);

        let received = read_frame(&mut server, 1024).await.unwrap().unwrap();
        assert_eq!(received, sent);
        assert_eq!(received.decode().unwrap()["service"], "tools");
        assert!(read_frame(&mut server, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_and_empty_frames_rejected() {
        let mut oversized: &[u8] = &[0, 0, 0x10, 0, MSG_REQUEST];
        let err = read_frame(&mut oversized, 16).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        let mut empty: &[u8] = &[0, 0, 0, 0];
        assert!(read_frame(&mut empty, 16).await.is_err());
    }
}
