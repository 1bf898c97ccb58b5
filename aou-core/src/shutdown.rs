//! Connection tracking for graceful shutdown
//!
//! Every accepted connection holds a [`ConnectionGuard`]. Shutdown stops
//! admitting new connections and then waits, up to a grace period, for the
//! guards of in-flight connections to drop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};
use tracing::{info, warn};

/// Connection tracker for draining in-flight requests
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    inner: Arc<TrackerState>,
}

#[derive(Debug)]
struct TrackerState {
    active: AtomicU64,
    accepting: AtomicBool,
    idle: Notify,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TrackerState {
                active: AtomicU64::new(0),
                accepting: AtomicBool::new(true),
                idle: Notify::new(),
            }),
        }
    }

    /// Register a connection.
    ///
    /// Returns `None` once shutdown has begun.
    pub fn track(&self) -> Option<ConnectionGuard> {
        if !self.is_accepting() {
            return None;
        }
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        Some(ConnectionGuard {
            tracker: self.clone(),
        })
    }

    pub fn active_count(&self) -> u64 {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn stop_accepting(&self) {
        self.inner.accepting.store(false, Ordering::Release);
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::Acquire)
    }

    /// Wait for all tracked connections to finish.
    ///
    /// Returns true if drained within `grace`, false otherwise.
    pub async fn drain(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;

        loop {
            // Registered before the check so a release in between is not missed.
            let idle = self.inner.idle.notified();
            if self.active_count() == 0 {
                info!("All connections drained");
                return true;
            }
            if timeout_at(deadline, idle).await.is_err() {
                warn!(
                    active = self.active_count(),
                    "Connection drain timed out"
                );
                return false;
            }
        }
    }

    fn release(&self) {
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for a tracked connection; releases its slot on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    tracker: ConnectionTracker,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.tracker.release();
    }
}
