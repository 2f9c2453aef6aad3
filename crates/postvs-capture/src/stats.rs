use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the capture engine.
///
/// Cheap to update from the replay thread and safe to read from another thread.
#[derive(Debug, Default)]
pub struct CaptureStats {
    capture_requests: AtomicU64,
    cache_hits: AtomicU64,
    records_created: AtomicU64,
    stream_out_draws: AtomicU64,
    submissions: AtomicU64,
    scratch_reallocations: AtomicU64,
    allocation_failures: AtomicU64,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_capture_requests(&self) {
        self.capture_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_records_created(&self) {
        self.records_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_stream_out_draws(&self, draws: u64) {
        self.stream_out_draws.fetch_add(draws, Ordering::Relaxed);
    }

    pub fn inc_submissions(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_scratch_reallocations(&self) {
        self.scratch_reallocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_allocation_failures(&self) {
        self.allocation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CaptureStatsSnapshot {
        CaptureStatsSnapshot {
            capture_requests: self.capture_requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            records_created: self.records_created.load(Ordering::Relaxed),
            stream_out_draws: self.stream_out_draws.load(Ordering::Relaxed),
            submissions: self.submissions.load(Ordering::Relaxed),
            scratch_reallocations: self.scratch_reallocations.load(Ordering::Relaxed),
            allocation_failures: self.allocation_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStatsSnapshot {
    pub capture_requests: u64,
    pub cache_hits: u64,
    pub records_created: u64,
    /// Patched draws recorded, including statistics-query passes.
    pub stream_out_draws: u64,
    pub submissions: u64,
    pub scratch_reallocations: u64,
    /// Scratch or output allocations that failed or were refused by the size clamp.
    pub allocation_failures: u64,
}
