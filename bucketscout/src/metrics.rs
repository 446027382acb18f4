use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Counters shared by every worker of one search
#[derive(Debug, Clone, Default)]
pub struct SearchMetrics {
    objects_scanned: Arc<AtomicU64>,
    bytes_scanned: Arc<AtomicU64>,
    fetch_failures: Arc<AtomicU64>,
    matches: Arc<AtomicU64>,
}

impl SearchMetrics {
    /// Creates a new SearchMetrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fetched and scanned object
    pub fn record_object(&self, bytes: u64) {
        self.objects_scanned.fetch_add(1, Ordering::Relaxed);
        let total = self.bytes_scanned.fetch_add(bytes, Ordering::Relaxed) + bytes;
        debug!("Scanned {} bytes, total: {} bytes", bytes, total);
    }

    /// Records an object that could not be fetched
    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a matching line
    pub fn record_match(&self) {
        self.matches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn objects_scanned(&self) -> u64 {
        self.objects_scanned.load(Ordering::Relaxed)
    }

    pub fn bytes_scanned(&self) -> u64 {
        self.bytes_scanned.load(Ordering::Relaxed)
    }

    pub fn fetch_failures(&self) -> u64 {
        self.fetch_failures.load(Ordering::Relaxed)
    }

    pub fn matches(&self) -> u64 {
        self.matches.load(Ordering::Relaxed)
    }

    /// Logs the current counters
    pub fn log_stats(&self) {
        info!(
            "Search stats: {} objects scanned, {} bytes, {} fetch failures, {} matches",
            self.objects_scanned(),
            self.bytes_scanned(),
            self.fetch_failures(),
            self.matches()
        );
    }
}
