use crate::config::FramingConfig;
use crate::error::Result;
use crate::server::metrics::LoginCounter;
use crate::transport::frame::FrameResult;
use crate::transport::reader::FrameReader;
use crate::transport::writer::FrameWriter;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// A TCP connection speaking the framed protocol
pub type TcpFramedConnection = FramedConnection<OwnedReadHalf, OwnedWriteHalf>;

/// Frame reader and writer over one connection.
///
/// Exactly one task may read; writes and close can come from any task that
/// holds a [`FrameWriter`] handle obtained via [`FramedConnection::writer`].
pub struct FramedConnection<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    peer: SocketAddr,
    local: Option<SocketAddr>,
}

impl FramedConnection<OwnedReadHalf, OwnedWriteHalf> {
    /// Wraps a connected TCP stream
    pub fn from_tcp(stream: TcpStream, config: &FramingConfig) -> Result<Self> {
        let peer = stream.peer_addr()?;
        let local = stream.local_addr().ok();
        let (read_half, write_half) = stream.into_split();

        let mut conn = Self::new(read_half, write_half, peer, config);
        conn.local = local;
        Ok(conn)
    }
}

impl<R: Send + 'static, W> FramedConnection<R, W> {
    /// Pairs `reader` and `writer`; closing the writer releases both
    pub fn new(reader: R, writer: W, peer: SocketAddr, config: &FramingConfig) -> Self {
        let writer = FrameWriter::new(writer);
        let reader = FrameReader::new(reader, config).with_close_signal(writer.close_signal());
        writer.on_close(reader.releaser());
        Self {
            reader,
            writer,
            peer,
            local: None,
        }
    }
}

impl<R, W> FramedConnection<R, W> {

    /// Sink notified when a login grace period expires
    pub fn with_login_counter(mut self, counter: Arc<dyn LoginCounter>) -> Self {
        self.reader = self.reader.with_login_counter(counter);
        self
    }

    /// Handle for writing and closing from another task
    pub fn writer(&self) -> FrameWriter<W> {
        self.writer.clone()
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_closed()
    }

    pub fn awaiting_first_frame(&self) -> bool {
        self.reader.awaiting_first_frame()
    }

    pub fn into_split(self) -> (FrameReader<R>, FrameWriter<W>) {
        (self.reader, self.writer)
    }
}

impl<R: AsyncRead + Unpin, W> FramedConnection<R, W> {
    /// See [`FrameReader::read_frame`]
    pub async fn read_frame(&mut self, max_payload: Option<usize>) -> Result<FrameResult> {
        self.reader.read_frame(max_payload).await
    }
}

impl<R, W: AsyncWrite + Unpin> FramedConnection<R, W> {
    pub async fn write_frame(&self, text: &str) -> Result<()> {
        self.writer.write_frame(text).await
    }

    pub async fn close(&self) {
        self.writer.close().await
    }
}

impl<R, W> fmt::Display for FramedConnection<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.local {
            Some(local) => write!(f, "Connection[peer={}, local={}]", self.peer, local),
            None => write!(f, "Connection[peer={}]", self.peer),
        }
    }
}
