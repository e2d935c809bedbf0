//! Length-prefixed framing of [`ChatMessage`] records.
//!
//! ```text
//! | 4-byte big-endian length | UTF-8 JSON record (length bytes) |
//! ```
//!
//! Each read returns exactly one complete record or fails. A failed read leaves
//! the stream at an unknown position, so callers must drop the connection.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::ChatMessage;

/// Largest accepted frame body (1 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Framing errors
#[derive(Debug, Error)]
pub enum CodecError {
    /// The peer closed the stream before a whole frame arrived
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The declared frame length exceeds the configured maximum
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    MessageTooLarge { len: usize, max: usize },

    /// The frame body is not a valid record
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encoder/decoder for length-prefixed records
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameCodec {
    /// Create a codec that rejects frames larger than `max_frame_len` bytes.
    ///
    /// The limit is clamped to what a 4-byte prefix can express.
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            max_frame_len: max_frame_len.min(u32::MAX as usize),
        }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Serialize a record into one frame (prefix + body).
    pub fn encode(&self, message: &ChatMessage) -> Result<Vec<u8>, CodecError> {
        let body =
            serde_json::to_vec(message).map_err(|e| CodecError::MalformedMessage(e.to_string()))?;
        if body.len() > self.max_frame_len {
            return Err(CodecError::MessageTooLarge {
                len: body.len(),
                max: self.max_frame_len,
            });
        }

        let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + body.len());
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Parse a frame body (without prefix) into a record.
    pub fn decode_body(&self, body: &[u8]) -> Result<ChatMessage, CodecError> {
        let text =
            std::str::from_utf8(body).map_err(|e| CodecError::MalformedMessage(e.to_string()))?;
        serde_json::from_str(text).map_err(|e| CodecError::MalformedMessage(e.to_string()))
    }

    /// Read exactly one record from `reader`.
    ///
    /// Suspends until the prefix and the whole body have arrived. An oversized
    /// prefix fails before any body byte is read.
    pub async fn read_message<R>(&self, reader: &mut R) -> Result<ChatMessage, CodecError>
    where
        R: AsyncRead + Unpin,
    {
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        read_exact_or_closed(reader, &mut prefix).await?;

        let len = u32::from_be_bytes(prefix) as usize;
        if len > self.max_frame_len {
            return Err(CodecError::MessageTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        let mut body = vec![0u8; len];
        read_exact_or_closed(reader, &mut body).await?;
        self.decode_body(&body)
    }

    /// Encode a record and write it as one frame, then flush.
    pub async fn write_message<W>(
        &self,
        writer: &mut W,
        message: &ChatMessage,
    ) -> Result<(), CodecError>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = self.encode(message)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;
        Ok(())
    }
}

async fn read_exact_or_closed<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), CodecError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(CodecError::ConnectionClosed)
        }
        Err(e) => Err(CodecError::Io(e)),
    }
}
