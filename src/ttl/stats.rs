//! Lock-free counters for the TTL layer.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the coordinator and the sweeper.
#[derive(Debug, Default)]
pub struct TtlMetrics {
    pub(crate) keys_tracked: AtomicU64,
    pub(crate) keys_cleared: AtomicU64,
    pub(crate) sweeps: AtomicU64,
    pub(crate) sweeps_abandoned: AtomicU64,
    pub(crate) keys_expired: AtomicU64,
    pub(crate) index_errors: AtomicU64,
    pub(crate) data_errors: AtomicU64,
    pub(crate) scan_errors: AtomicU64,
}

impl TtlMetrics {
    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of every counter.
    pub fn snapshot(&self) -> TtlStats {
        TtlStats {
            keys_tracked: self.keys_tracked.load(Ordering::Relaxed),
            keys_cleared: self.keys_cleared.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            sweeps_abandoned: self.sweeps_abandoned.load(Ordering::Relaxed),
            keys_expired: self.keys_expired.load(Ordering::Relaxed),
            index_errors: self.index_errors.load(Ordering::Relaxed),
            data_errors: self.data_errors.load(Ordering::Relaxed),
            scan_errors: self.scan_errors.load(Ordering::Relaxed),
        }
    }
}

/// TTL layer statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TtlStats {
    /// Keys whose expiry was set or renewed
    pub keys_tracked: u64,
    /// Keys whose expiry tracking was explicitly cleared
    pub keys_cleared: u64,
    /// Sweeps that ran to completion
    pub sweeps: u64,
    /// Sweeps abandoned because the scan failed
    pub sweeps_abandoned: u64,
    /// Keys removed by sweeps
    pub keys_expired: u64,
    /// Failed index reads or writes
    pub index_errors: u64,
    /// Failed primary-data deletes issued by sweeps
    pub data_errors: u64,
    /// Failed sweep scans
    pub scan_errors: u64,
}
