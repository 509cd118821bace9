use crate::config::FramingConfig;
use crate::error::{FrameError, Result};
use crate::server::metrics::LoginCounter;
use crate::transport::frame::{ErrorInfo, FrameResult};
use crate::transport::framing::{FrameCodec, HEADER_LEN};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

/// Lower bound for a read timeout derived from the first-frame deadline
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Timeout policy for the reads of one `read_frame` call
#[derive(Debug, Clone, Copy)]
enum ReadPhase {
    /// Login grace period: all reads of the call share one deadline
    FirstFrame { deadline: Instant, budget: Duration },
    /// Every read gets the idle timeout afresh
    Steady { idle: Option<Duration> },
}

impl ReadPhase {
    fn read_timeout(&self) -> Option<Duration> {
        match self {
            ReadPhase::FirstFrame { deadline, .. } => Some(
                deadline
                    .saturating_duration_since(Instant::now())
                    .max(MIN_READ_TIMEOUT),
            ),
            ReadPhase::Steady { idle } => *idle,
        }
    }

    fn timeout_error(&self) -> FrameError {
        match self {
            ReadPhase::FirstFrame { budget, .. } => FrameError::Timeout(*budget),
            ReadPhase::Steady { idle } => FrameError::Timeout(idle.unwrap_or_default()),
        }
    }

    fn is_first_frame(&self) -> bool {
        matches!(self, ReadPhase::FirstFrame { .. })
    }
}

/// Reads length-prefixed UTF-8 frames from an async reader.
///
/// Not meant for concurrent use; `read_frame` takes `&mut self`. Reads never
/// take the writer's lock, a close from the paired [`crate::FrameWriter`]
/// is observed through a watch signal instead.
pub struct FrameReader<R> {
    /// Parked between reads; emptied by a local close
    io: Arc<Mutex<Option<R>>>,
    closed: Option<watch::Receiver<bool>>,
    first_frame_seen: bool,
    read_timeout: Option<Duration>,
    first_frame_timeout: Option<Duration>,
    login_counter: Option<Arc<dyn LoginCounter>>,
}

impl<R> FrameReader<R> {
    pub fn new(io: R, config: &FramingConfig) -> Self {
        let first_frame_timeout = config.first_frame_timeout();
        Self {
            io: Arc::new(Mutex::new(Some(io))),
            closed: None,
            // no grace period configured: start in steady state
            first_frame_seen: first_frame_timeout.is_none(),
            read_timeout: config.read_timeout(),
            first_frame_timeout,
            login_counter: None,
        }
    }

    /// Sink notified when the first frame does not arrive in time
    pub fn with_login_counter(mut self, counter: Arc<dyn LoginCounter>) -> Self {
        self.login_counter = Some(counter);
        self
    }

    pub(crate) fn with_close_signal(mut self, closed: watch::Receiver<bool>) -> Self {
        self.closed = Some(closed);
        self
    }

    /// True until the first non-empty frame has been read
    pub fn awaiting_first_frame(&self) -> bool {
        !self.first_frame_seen
    }

    /// True once a local close released the underlying reader
    pub fn is_closed(&self) -> bool {
        lock(&self.io).is_none()
    }

    /// Consume the frame reader and return the underlying reader, if it was
    /// not released by a close
    pub fn into_inner(self) -> Option<R> {
        lock(&self.io).take()
    }

    /// Drops the underlying reader when called, unless a read holds it; that
    /// read then drops it itself on seeing the close signal
    pub(crate) fn releaser(&self) -> impl FnOnce() + Send + 'static + use<R>
    where
        R: Send + 'static,
    {
        let slot = Arc::downgrade(&self.io);
        move || {
            if let Some(slot) = slot.upgrade() {
                drop(lock(&slot).take());
            }
        }
    }

    fn close_signalled(&self) -> bool {
        self.closed.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn phase(&self) -> ReadPhase {
        match self.first_frame_timeout {
            Some(budget) if !self.first_frame_seen => ReadPhase::FirstFrame {
                deadline: Instant::now() + budget,
                budget,
            },
            _ => ReadPhase::Steady {
                idle: self.read_timeout,
            },
        }
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Waits until the next frame has arrived.
    ///
    /// `max_payload` rejects frames whose declared length is larger; such a
    /// frame's payload is left unread and the result is fatal. End of stream
    /// is always an error: [`FrameError::ConnectionClosed`] between frames,
    /// a truncation error anywhere else.
    pub async fn read_frame(&mut self, max_payload: Option<usize>) -> Result<FrameResult> {
        let phase = self.phase();
        match self.read_frame_in(phase, max_payload).await {
            Err(FrameError::Timeout(limit)) if phase.is_first_frame() => {
                debug!("No frame received within login grace period of {:?}", limit);
                if let Some(counter) = &self.login_counter {
                    counter.record_closed_without_login();
                }
                Err(FrameError::Timeout(limit))
            }
            other => other,
        }
    }

    async fn read_frame_in(
        &mut self,
        phase: ReadPhase,
        max_payload: Option<usize>,
    ) -> Result<FrameResult> {
        let len = self.read_length(&phase).await? as usize;
        if len == 0 {
            return Ok(FrameResult::Message(String::new()));
        }

        if let Some(max) = max_payload {
            if len > max {
                warn!("Rejecting frame of {} bytes (max {})", len, max);
                return Ok(FrameResult::TooLong(ErrorInfo::too_long(len as u32)));
            }
        }

        debug!("Reading frame of {} bytes", len);
        let mut payload = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = self.read_some(&mut payload[filled..], &phase).await?;
            if n == 0 {
                return Err(FrameError::IncompleteFrame {
                    expected: len,
                    received: filled,
                });
            }
            filled += n;
        }

        self.first_frame_seen = true;
        Ok(FrameCodec::decode_payload(payload))
    }

    async fn read_length(&mut self, phase: &ReadPhase) -> Result<u32> {
        let mut header = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = self.read_some(&mut header[filled..], phase).await?;
            if n == 0 {
                return Err(if filled == 0 {
                    FrameError::ConnectionClosed
                } else {
                    FrameError::TruncatedHeader { received: filled }
                });
            }
            filled += n;
        }
        FrameCodec::decode_length(header)
    }

    /// One read call under the phase's timeout, racing a local close
    async fn read_some(&mut self, buf: &mut [u8], phase: &ReadPhase) -> Result<usize> {
        let Some(mut io) = lock(&self.io).take() else {
            return Err(FrameError::Closed);
        };

        let limit = phase.read_timeout();
        let read = async {
            let n = match limit {
                Some(limit) => timeout(limit, io.read(buf))
                    .await
                    .map_err(|_| phase.timeout_error())??,
                None => io.read(buf).await?,
            };
            Ok::<_, FrameError>(n)
        };

        let outcome = tokio::select! {
            biased;
            _ = close_requested(&mut self.closed) => None,
            result = read => Some(result),
        };

        match outcome {
            Some(result) => {
                self.park(io)?;
                result
            }
            // our half of the connection is dropped here
            None => Err(FrameError::Closed),
        }
    }

    /// Puts the reader back, or drops it if the connection got closed
    /// during the read
    fn park(&self, io: R) -> Result<()> {
        let mut slot = lock(&self.io);
        if self.close_signalled() {
            return Err(FrameError::Closed);
        }
        *slot = Some(io);
        Ok(())
    }
}

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Resolves once the paired writer closed the connection. Never resolves
/// without a writer, or after every writer handle was dropped.
async fn close_requested(closed: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = closed {
        if rx.wait_for(|closed| *closed).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}
