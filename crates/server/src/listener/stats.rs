use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the accept loop and the workers.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    accepted: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    pub(crate) fn accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ListenerStats {
        ListenerStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// A point in time view of what a listener has done.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListenerStats {
    /// Connections accepted
    pub accepted: u64,
    /// Connections served successfully
    pub processed: u64,
    /// Connections that ended with a framing, processing or transport error, or a panic
    pub failed: u64,
    /// Connections closed unserved because of shutdown
    pub dropped: u64,
}
