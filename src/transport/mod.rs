pub mod connection;
pub mod frame;
pub mod framing;
pub mod reader;
pub mod shutdown;
pub mod writer;

#[cfg(feature = "tcp")]
pub mod tcp;

pub use connection::{FramedConnection, TcpFramedConnection};
pub use frame::{ErrorInfo, ErrorKind, FrameResult};
pub use framing::FrameCodec;
pub use reader::FrameReader;
pub use shutdown::ShutdownCoordinator;
pub use writer::FrameWriter;

#[cfg(feature = "tcp")]
pub use tcp::{TcpServerConfig, run_with_framing, serve};
