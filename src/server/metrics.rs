use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Sink for connections abandoned during the login phase.
///
/// Notified by the frame reader when the first frame of a connection does not
/// arrive within the grace period.
pub trait LoginCounter: Send + Sync {
    fn record_closed_without_login(&self);
}

/// Metrics collector for framed connections
#[derive(Debug, Default)]
pub struct Metrics {
    /// Connections accepted by the server
    connections_accepted: AtomicU64,
    /// Frames read and decoded
    frames_read: AtomicU64,
    /// Frames written
    frames_written: AtomicU64,
    /// Frames rejected for exceeding the payload limit
    frames_too_long: AtomicU64,
    /// Frames with malformed UTF-8 payloads
    frames_undecodable: AtomicU64,
    /// Connections whose first frame never arrived
    closed_without_login: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_read(&self) {
        self.frames_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_written(&self) {
        self.frames_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_too_long(&self) {
        self.frames_too_long.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_undecodable(&self) {
        self.frames_undecodable.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            frames_read: self.frames_read.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            frames_too_long: self.frames_too_long.load(Ordering::Relaxed),
            frames_undecodable: self.frames_undecodable.load(Ordering::Relaxed),
            closed_without_login: self.closed_without_login.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        for counter in [
            &self.connections_accepted,
            &self.frames_read,
            &self.frames_written,
            &self.frames_too_long,
            &self.frames_undecodable,
            &self.closed_without_login,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl LoginCounter for Metrics {
    fn record_closed_without_login(&self) {
        let total = self.closed_without_login.fetch_add(1, Ordering::Relaxed) + 1;
        info!("Connection closed without login (total {})", total);
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub connections_accepted: u64,
    pub frames_read: u64,
    pub frames_written: u64,
    pub frames_too_long: u64,
    pub frames_undecodable: u64,
    pub closed_without_login: u64,
}

/// Initialize logging with tracing
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rri_frame=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Log server startup
pub fn log_startup(addr: &str, max_payload: Option<usize>) {
    info!("╔══════════════════════════════════════╗");
    info!("║      Framed Server Started           ║");
    info!("╚══════════════════════════════════════╝");
    info!("Address: {}", addr);
    match max_payload {
        Some(max) => info!("Max payload: {} bytes", max),
        None => info!("Max payload: unlimited"),
    }
    info!("Ready to accept connections");
}

/// Log server shutdown
pub fn log_shutdown(snapshot: &MetricsSnapshot) {
    info!("╔══════════════════════════════════════╗");
    info!("║      Framed Server Shutting Down     ║");
    info!("╚══════════════════════════════════════╝");
    info!("Connections: {}", snapshot.connections_accepted);
    info!("Frames read/written: {}/{}", snapshot.frames_read, snapshot.frames_written);
    info!("Closed without login: {}", snapshot.closed_without_login);
}
