//! Error types for the framing layer.

use std::time::Duration;
use thiserror::Error;

/// Failures that leave a framed connection unusable.
///
/// Application-level problems with a single frame (too long, bad encoding)
/// are not errors; they come back as a [`crate::FrameResult`].
#[derive(Debug, Error)]
pub enum FrameError {
    /// Peer closed the stream cleanly before sending any header byte.
    #[error("Input stream of connection is empty: connection seems to be closed")]
    ConnectionClosed,

    /// Stream ended inside the 4-byte length header.
    #[error("Missing four bytes representing frame's length (received {received})")]
    TruncatedHeader { received: usize },

    /// Header denotes a length outside the signed 32-bit range.
    #[error("The four bytes representing frame's length denote a number that cannot be handled: {0}")]
    LengthOverflow(u64),

    /// Stream ended before the declared payload was complete.
    #[error("Expecting frame containing {expected} bytes, but received only {received} bytes")]
    IncompleteFrame { expected: usize, received: usize },

    /// A read did not complete in time.
    #[error("Read timed out after {0:?}")]
    Timeout(Duration),

    /// The connection was closed locally.
    #[error("Connection closed")]
    Closed,

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True for a clean shutdown by the peer between frames.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, FrameError::ConnectionClosed)
    }
}

/// Errors while loading a [`crate::FramingConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using FrameError.
pub type Result<T> = std::result::Result<T, FrameError>;
