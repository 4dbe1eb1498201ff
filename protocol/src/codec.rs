//! Message codec: framing and serialization for the wire protocol.
//!
//! A frame is a 4-byte big-endian length followed by a bincode body.

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::ProtocolError;

/// Maximum message size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16 MiB

/// Size of the length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_MESSAGE_SIZE as u64)
        .reject_trailing_bytes()
}

/// Encode a message for transmission (length-prefixed bincode).
pub fn encode(message: &impl Serialize) -> Result<Vec<u8>, ProtocolError> {
    let body = options()
        .serialize(message)
        .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if body.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: body.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode a message body (no length prefix).
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    options()
        .deserialize(data)
        .map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Decode one framed message from the front of `data`. Returns the message
/// and the number of bytes consumed.
pub fn decode_framed<T: DeserializeOwned>(data: &[u8]) -> Result<(T, usize), ProtocolError> {
    if data.len() < FRAME_HEADER_LEN {
        return Err(ProtocolError::Malformed("truncated length prefix".into()));
    }
    let body_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if body_len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: body_len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    let end = FRAME_HEADER_LEN + body_len;
    if data.len() < end {
        return Err(ProtocolError::Malformed(format!(
            "truncated body: {} of {body_len} bytes",
            data.len() - FRAME_HEADER_LEN
        )));
    }
    let message = decode(&data[FRAME_HEADER_LEN..end])?;
    Ok((message, end))
}

/// Read one frame body from `reader`.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut len_buf).await?;
    let body_len = u32::from_be_bytes(len_buf) as usize;
    if body_len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: body_len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut body = vec![0u8; body_len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Write an already framed message and flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &[u8],
) -> Result<(), ProtocolError> {
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}
