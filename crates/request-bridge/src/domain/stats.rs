//! Bridge statistics, kept as lock-free counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for bridged requests.
#[derive(Debug, Default)]
pub struct BridgeStats {
    /// Messages handed to the transport
    pub sent: AtomicU64,
    /// Replies decoded successfully
    pub completed: AtomicU64,
    /// Transport failures
    pub send_failures: AtomicU64,
    /// Replies with a non-ok status
    pub status_failures: AtomicU64,
    /// Replies with undecodable content
    pub decode_failures: AtomicU64,
    /// Waits that hit their deadline
    pub timeouts: AtomicU64,
}

/// Point-in-time copy of [`BridgeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStatsSnapshot {
    pub sent: u64,
    pub completed: u64,
    pub send_failures: u64,
    pub status_failures: u64,
    pub decode_failures: u64,
    pub timeouts: u64,
}

impl BridgeStats {
    pub fn snapshot(&self) -> BridgeStatsSnapshot {
        BridgeStatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            status_failures: self.status_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
