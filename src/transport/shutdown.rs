use crate::transport::writer::FrameWriter;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Graceful shutdown coordinator
///
/// Besides broadcasting the shutdown signal it keeps the writer handle of
/// every live connection, so that shutdown can close them out of band. A
/// connection's reader, waiting for the next frame, then fails promptly.
pub struct ShutdownCoordinator {
    tx: broadcast::Sender<()>,
    connections: Mutex<HashMap<u64, FrameWriter<OwnedWriteHalf>>>,
    next_id: AtomicU64,
}

/// Removes a connection from the coordinator when dropped
pub struct TrackedConnection {
    coordinator: Arc<ShutdownCoordinator>,
    id: u64,
}

impl Drop for TrackedConnection {
    fn drop(&mut self) {
        self.coordinator.untrack(self.id);
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Subscribe to shutdown signal
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger shutdown
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }

    /// Register a live connection until the returned guard is dropped
    pub fn track(self: &Arc<Self>, writer: FrameWriter<OwnedWriteHalf>) -> TrackedConnection {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock_connections().insert(id, writer);
        TrackedConnection {
            coordinator: self.clone(),
            id,
        }
    }

    pub fn live_connections(&self) -> usize {
        self.lock_connections().len()
    }

    /// Close every tracked connection; returns how many were closed
    pub async fn close_all(&self) -> usize {
        let writers: Vec<_> = self.lock_connections().drain().map(|(_, w)| w).collect();
        futures::future::join_all(writers.iter().map(|w| w.close())).await;
        writers.len()
    }

    fn untrack(&self, id: u64) {
        self.lock_connections().remove(&id);
    }

    fn lock_connections(&self) -> std::sync::MutexGuard<'_, HashMap<u64, FrameWriter<OwnedWriteHalf>>> {
        // the map stays consistent even if a holder panicked
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait for OS shutdown signals (CTRL+C, SIGTERM)
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        {
            use signal::unix::{SignalKind, signal};

            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(mut sigterm), Ok(mut sigint)) => {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            info!("Received SIGTERM");
                        }
                        _ = sigint.recv() => {
                            info!("Received SIGINT (CTRL+C)");
                        }
                    }
                }
                _ => {
                    warn!("Failed to register signal handlers, falling back to CTRL+C");
                    wait_for_ctrl_c().await;
                }
            }
        }

        #[cfg(not(unix))]
        wait_for_ctrl_c().await;

        info!("Initiating graceful shutdown...");
        self.shutdown();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received CTRL+C"),
        Err(e) => {
            warn!("Failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await
        }
    }
}

/// Helper to create a future that completes when shutdown is triggered
pub async fn wait_for_shutdown(mut rx: broadcast::Receiver<()>) {
    let _ = rx.recv().await;
}
