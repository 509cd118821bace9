use crate::config::FramingConfig;
use crate::error::FrameError;
use crate::server::metrics::{Metrics, log_shutdown};
use crate::transport::connection::TcpFramedConnection;
use crate::transport::frame::FrameResult;
use crate::transport::shutdown::{ShutdownCoordinator, wait_for_shutdown};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Time granted to close live connections on shutdown
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Turns a received frame into the answer frame
pub type FrameHandler = Arc<dyn Fn(&FrameResult) -> String + Send + Sync>;

pub struct TcpServerConfig {
    pub addr: String,
    pub framing: FramingConfig,
    pub metrics: Arc<Metrics>,
    pub handler: FrameHandler,
}

impl TcpServerConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            framing: FramingConfig::default(),
            metrics: Arc::new(Metrics::new()),
            handler: Arc::new(echo_handler),
        }
    }

    pub fn with_framing(mut self, framing: FramingConfig) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&FrameResult) -> String + Send + Sync + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }
}

/// Answers a message with its own text and a rejected frame with its error
pub fn echo_handler(frame: &FrameResult) -> String {
    match frame.error() {
        Some(info) => format!("error: {}", info),
        None => frame.text().to_string(),
    }
}

/// Run TCP server with length-prefixed framing until SIGINT/SIGTERM
pub async fn run_with_framing(config: TcpServerConfig) -> Result<()> {
    let listener = TcpListener::bind(&config.addr).await?;
    info!("Framed TCP server listening on {}", listener.local_addr()?);

    let shutdown = Arc::new(ShutdownCoordinator::new());
    let server = serve(listener, config, shutdown.clone());

    // Spawn signal handler
    tokio::spawn(async move {
        shutdown.wait_for_signal().await;
    });

    server.await
}

/// Accept connections on `listener` until `shutdown` fires, then close every
/// connection still open.
///
/// Subscribes to `shutdown` when called, so a shutdown triggered before the
/// returned future is first polled still stops it.
pub fn serve(
    listener: TcpListener,
    config: TcpServerConfig,
    shutdown: Arc<ShutdownCoordinator>,
) -> impl Future<Output = Result<()>> + Send {
    let shutdown_rx = shutdown.subscribe();
    accept_loop(listener, config, shutdown, shutdown_rx)
}

async fn accept_loop(
    listener: TcpListener,
    config: TcpServerConfig,
    shutdown: Arc<ShutdownCoordinator>,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let TcpServerConfig {
        framing,
        metrics,
        handler,
        ..
    } = config;
    let shutdown_signal = wait_for_shutdown(shutdown_rx);
    tokio::pin!(shutdown_signal);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((socket, peer)) => {
                        debug!("Accepted connection from {}", peer);
                        let conn = match TcpFramedConnection::from_tcp(socket, &framing) {
                            Ok(conn) => conn.with_login_counter(metrics.clone()),
                            Err(e) => {
                                warn!("Dropping connection from {}: {}", peer, e);
                                continue;
                            }
                        };
                        // close_all only sees tracked connections
                        let tracked = shutdown.track(conn.writer());
                        metrics.record_connection();

                        let max_payload = framing.max_payload_size;
                        let metrics = metrics.clone();
                        let handler = handler.clone();

                        tokio::spawn(async move {
                            let _tracked = tracked;
                            match handle_framed_connection(conn, max_payload, &metrics, &handler).await {
                                Ok(()) => {}
                                Err(e @ FrameError::Timeout(_)) => warn!("Connection from {}: {}", peer, e),
                                Err(e) => error!("Connection error from {}: {:?}", peer, e),
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {:?}", e);
                    }
                }
            }
            _ = &mut shutdown_signal => {
                info!("Shutting down TCP server");
                break;
            }
        }
    }

    match tokio::time::timeout(CLOSE_TIMEOUT, shutdown.close_all()).await {
        Ok(closed) => info!("Closed {} live connections", closed),
        Err(_) => warn!("Closing live connections timed out after {:?}", CLOSE_TIMEOUT),
    }
    log_shutdown(&metrics.snapshot());

    Ok(())
}

async fn handle_framed_connection(
    mut conn: TcpFramedConnection,
    max_payload: Option<usize>,
    metrics: &Metrics,
    handler: &FrameHandler,
) -> std::result::Result<(), FrameError> {
    let result = serve_frames(&mut conn, max_payload, metrics, handler).await;
    // any failure leaves the stream unusable
    conn.close().await;
    result
}

async fn serve_frames(
    conn: &mut TcpFramedConnection,
    max_payload: Option<usize>,
    metrics: &Metrics,
    handler: &FrameHandler,
) -> std::result::Result<(), FrameError> {
    loop {
        let frame = match conn.read_frame(max_payload).await {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => {
                debug!("{} closed by peer", conn);
                return Ok(());
            }
            Err(FrameError::Closed) => {
                debug!("{} closed locally", conn);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match &frame {
            FrameResult::Message(_) => metrics.record_frame_read(),
            FrameResult::TooLong(_) => metrics.record_too_long(),
            FrameResult::Undecodable(_) => metrics.record_undecodable(),
        }

        let reply = handler(&frame);
        conn.write_frame(&reply).await?;
        metrics.record_frame_written();

        if frame.is_fatal() {
            warn!("Closing {} after rejecting an oversized frame", conn);
            return Ok(());
        }
    }
}
