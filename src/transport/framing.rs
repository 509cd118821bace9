use crate::error::{FrameError, Result};
use crate::transport::frame::{ErrorInfo, FrameResult};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Size of the length prefix in bytes
pub const HEADER_LEN: usize = 4;

/// Largest payload length the header may announce
pub const MAX_FRAME_LEN: u32 = i32::MAX as u32;

/// Frame format: 4-byte length prefix (big-endian) + UTF-8 payload
///
/// A length of 0 is a valid, empty frame.
pub struct FrameCodec;

impl FrameCodec {
    /// Encodes a payload length as the 4-byte big-endian header
    pub fn encode_length(len: u32) -> [u8; HEADER_LEN] {
        len.to_be_bytes()
    }

    /// Checks that a payload of `len` bytes fits the header
    pub fn frame_length(len: usize) -> Result<u32> {
        match u32::try_from(len) {
            Ok(len) if len <= MAX_FRAME_LEN => Ok(len),
            _ => Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Frame too large: {} bytes (max {})", len, MAX_FRAME_LEN),
            ))),
        }
    }

    /// Composes the 4 header bytes into a payload length.
    ///
    /// Lengths above the signed 32-bit range are rejected.
    pub fn decode_length(header: [u8; HEADER_LEN]) -> Result<u32> {
        let len = header
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));

        if len > u64::from(MAX_FRAME_LEN) {
            return Err(FrameError::LengthOverflow(len));
        }
        Ok(len as u32)
    }

    /// Strict UTF-8 decode of a complete payload.
    ///
    /// Malformed input is reported as [`FrameResult::Undecodable`], never as
    /// an error: the frame was consumed and the stream is still in sync.
    pub fn decode_payload(payload: Vec<u8>) -> FrameResult {
        match String::from_utf8(payload) {
            Ok(text) => FrameResult::Message(text),
            Err(e) => {
                warn!("Decoding received message failed: {}", e.utf8_error());
                FrameResult::Undecodable(ErrorInfo::encoding_illegal())
            }
        }
    }

    /// Writes a length-prefixed frame to the writer and flushes it
    ///
    /// Format: [4-byte length][payload]
    /// Length is the size of the UTF-8 payload in bytes (u32, big-endian)
    pub async fn write_frame<W>(writer: &mut W, text: &str) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let payload = text.as_bytes();
        let len_bytes = Self::encode_length(Self::frame_length(payload.len())?);
        debug!("Writing frame of {} bytes", payload.len());

        // Write length prefix
        writer.write_all(&len_bytes).await?;
        // Write payload
        writer.write_all(payload).await?;
        writer.flush().await?;

        Ok(())
    }
}
