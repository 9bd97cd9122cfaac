//! Progress aggregation shared across concurrent chunk handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Callback invoked with the cumulative number of bytes transferred.
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Shared per-download progress state: a monotonically non-decreasing byte
/// counter plus a lock that serializes callback invocation so observers see
/// strictly increasing cumulative totals.
///
/// The lock is held only for one aggregation step (counter increment plus
/// callback call), never across an I/O wait. Without a callback the counter
/// is updated lock-free.
pub(crate) struct ProgressTracker {
    total: AtomicU64,
    callback: Option<ProgressCallback>,
    callback_lock: Mutex<()>,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            total: AtomicU64::new(0),
            callback,
            callback_lock: Mutex::new(()),
        }
    }

    /// Records `len` newly transferred bytes and reports the new cumulative
    /// total to the callback, if one is configured.
    pub(crate) fn record(&self, len: u64) {
        match &self.callback {
            None => {
                self.total.fetch_add(len, Ordering::Relaxed);
            }
            Some(callback) => {
                // The increment happens under the lock so concurrent chunks
                // cannot deliver totals out of order.
                let _guard = self.callback_lock.lock();
                let total = self.total.fetch_add(len, Ordering::Relaxed) + len;
                callback(total);
            }
        }
    }

    pub(crate) fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}
