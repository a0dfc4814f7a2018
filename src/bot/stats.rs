//! Download counters for `/stats`

use std::sync::atomic::{AtomicU64, Ordering};

/// Completed and failed download counters
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicU64,
    failed: AtomicU64,
}

impl DownloadStats {
    /// Count a delivered request
    pub fn record_success(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a request that ended with an error message
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Delivered requests so far
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Failed requests so far
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = DownloadStats::default();
        stats.record_success();
        stats.record_success();
        stats.record_failure();

        assert_eq!(stats.completed(), 2);
        assert_eq!(stats.failed(), 1);
    }
}
