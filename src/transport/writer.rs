use crate::error::{FrameError, Result};
use crate::transport::framing::FrameCodec;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

struct Shared<W> {
    /// `None` once closed
    io: Mutex<Option<W>>,
    closed: watch::Sender<bool>,
    /// Releases the paired read half
    on_close: StdMutex<Option<Box<dyn FnOnce() + Send>>>,
}

/// Writing and closing side of a framed connection.
///
/// Clones share the same writer. Writes and close run under one lock, so a
/// close never cuts a frame in half and nothing is written after a close.
pub struct FrameWriter<W> {
    shared: Arc<Shared<W>>,
}

impl<W> Clone for FrameWriter<W> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<W> FrameWriter<W> {
    pub fn new(io: W) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                io: Mutex::new(Some(io)),
                closed,
                on_close: StdMutex::new(None),
            }),
        }
    }

    /// Signal flipping to `true` when the connection gets closed
    pub(crate) fn close_signal(&self) -> watch::Receiver<bool> {
        self.shared.closed.subscribe()
    }

    /// Runs `release` once the connection is closed
    pub(crate) fn on_close(&self, release: impl FnOnce() + Send + 'static) {
        *self.lock_on_close() = Some(Box::new(release));
    }

    pub fn is_closed(&self) -> bool {
        *self.shared.closed.borrow()
    }

    fn lock_on_close(&self) -> std::sync::MutexGuard<'_, Option<Box<dyn FnOnce() + Send>>> {
        self.shared
            .on_close
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Writes one frame and flushes it.
    ///
    /// Waits for a concurrent write or close to finish first.
    pub async fn write_frame(&self, text: &str) -> Result<()> {
        let mut io = self.shared.io.lock().await;
        let io = io.as_mut().ok_or(FrameError::Closed)?;
        FrameCodec::write_frame(io, text).await
    }

    /// Flushes and shuts down the writer, then releases the read half or
    /// wakes the read holding it.
    ///
    /// Idempotent. Never fails: flush and shutdown errors are only logged.
    pub async fn close(&self) {
        if self.is_closed() {
            return;
        }

        let mut guard = self.shared.io.lock().await;
        let Some(mut io) = guard.take() else {
            return;
        };

        if let Err(e) = io.flush().await {
            warn!("Flushing connection before close failed: {}", e);
        }
        if let Err(e) = io.shutdown().await {
            warn!("Closing connection failed: {}", e);
        }
        drop(io);

        self.shared.closed.send_replace(true);
        let release = self.lock_on_close().take();
        if let Some(release) = release {
            release();
        }
        debug!("Connection closed");
    }
}
