use std::sync::atomic::{AtomicU64, Ordering};

/// Byte accounting shared between transfer workers and the progress reporter.
///
/// Only successful operations move `bytes_done`; the figure drives progress
/// output, never correctness.
#[derive(Debug, Default)]
pub struct TransferProgress {
    pub bytes_done: AtomicU64,
    pub bytes_total: AtomicU64,
    pub operations_done: AtomicU64,
}

impl TransferProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_total(total: u64) -> Self {
        let progress = Self::new();
        progress.bytes_total.store(total, Ordering::Relaxed);
        progress
    }

    pub fn set_total(&self, total: u64) {
        self.bytes_total.store(total, Ordering::Relaxed);
    }

    pub(crate) fn record(&self, length: u64) {
        self.bytes_done.fetch_add(length, Ordering::Relaxed);
        self.operations_done.fetch_add(1, Ordering::Relaxed);
    }

    /// `(bytes_done, bytes_total)`
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.bytes_done.load(Ordering::Relaxed),
            self.bytes_total.load(Ordering::Relaxed),
        )
    }
}
