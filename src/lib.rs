// Wire format and framed connections
pub mod transport;

// Error types
pub mod error;

// Timeouts and limits
pub mod config;

// Metrics and login counter
pub mod server;

// Order-file client
pub mod client;

pub use config::FramingConfig;
pub use error::{ConfigError, FrameError};
pub use server::metrics::{LoginCounter, Metrics};
pub use transport::{
    ErrorInfo, ErrorKind, FrameCodec, FrameReader, FrameResult, FrameWriter, FramedConnection,
    TcpFramedConnection,
};
