use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters shared by producers and the worker.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    submitted: AtomicU64,
    accepted: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
    processed: AtomicU64,
    inference_failures: AtomicU64,
    alerts_raised: AtomicU64,
}

impl StatsCounters {
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference_failure(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self) {
        self.alerts_raised.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            frames_submitted: self.submitted.load(Ordering::Relaxed),
            frames_accepted: self.accepted.load(Ordering::Relaxed),
            frames_dropped: self.dropped.load(Ordering::Relaxed),
            frames_rejected: self.rejected.load(Ordering::Relaxed),
            frames_processed: self.processed.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time pipeline counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub frames_submitted: u64,
    pub frames_accepted: u64,
    /// Accepted frames later evicted by a newer one before processing.
    pub frames_dropped: u64,
    pub frames_rejected: u64,
    pub frames_processed: u64,
    pub inference_failures: u64,
    pub alerts_raised: u64,
}
