//! Connection observation
//!
//! The server reports every accepted and finished connection to a
//! [`ConnectionObserver`]. [`ConnectionCounter`] is the stock implementation.

use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Receives connection open/close notifications
pub trait ConnectionObserver: Debug + Send + Sync {
    /// A client connection was accepted
    fn on_open(&self, peer: SocketAddr);

    /// A client connection finished
    fn on_close(&self, peer: SocketAddr);
}

/// Live and total connection counts
#[derive(Debug, Default)]
pub struct ConnectionCounter {
    active: AtomicUsize,
    total: AtomicU64,
}

impl ConnectionCounter {
    /// Create a counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections currently open
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Connections accepted since start
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl ConnectionObserver for ConnectionCounter {
    fn on_open(&self, peer: SocketAddr) {
        let active = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("Connection from {} opened ({} active, {} total)", peer, active, total);
    }

    fn on_close(&self, peer: SocketAddr) {
        let active = self
            .active
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        debug!("Connection from {} closed ({} active)", peer, active);
    }
}

/// Calls [`ConnectionObserver::on_close`] when dropped
#[derive(Debug)]
pub struct ConnectionGuard {
    observer: Arc<dyn ConnectionObserver>,
    peer: SocketAddr,
}

impl ConnectionGuard {
    /// Report the connection as open and return the guard that closes it
    pub fn open(observer: Arc<dyn ConnectionObserver>, peer: SocketAddr) -> Self {
        observer.on_open(peer);
        ConnectionGuard { observer, peer }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.observer.on_close(self.peer);
    }
}
