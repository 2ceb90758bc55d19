//! In-flight request tracking.
//!
//! # Responsibilities
//! - Count requests currently being served across both listeners
//! - Give each request a sequence number for log correlation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Tracks in-flight requests.
#[derive(Debug, Clone, Default)]
pub struct InFlightTracker {
    active: Arc<AtomicU64>,
    served: Arc<AtomicU64>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new request. Returns a guard that decrements on drop.
    pub fn track(&self) -> InFlightGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        let seq = self.served.fetch_add(1, Ordering::Relaxed) + 1;
        InFlightGuard {
            active: Arc::clone(&self.active),
            seq,
        }
    }

    /// Requests currently in flight.
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Requests accepted since startup.
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::Relaxed)
    }
}

/// Guard held for the lifetime of one request.
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<AtomicU64>,
    seq: u64,
}

impl InFlightGuard {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
