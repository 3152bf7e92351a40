mod types;

pub use types::StatsSnapshot;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Instant;

use chrono::{DateTime, Utc};

/// Process-wide capture/extraction counters. Owned by the dispatcher and
/// handed to job completions; never persisted.
pub struct Stats {
    inner: Arc<StatsState>,
}

struct StatsState {
    total_captures: AtomicU64,
    successful_extractions: AtomicU64,
    failed_extractions: AtomicU64,
    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StatsState {
                total_captures: AtomicU64::new(0),
                successful_extractions: AtomicU64::new(0),
                failed_extractions: AtomicU64::new(0),
                start_time: Instant::now(),
                started_at: Utc::now(),
            }),
        }
    }

    pub(crate) fn record_capture(&self) {
        self.inner.total_captures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.inner
            .successful_extractions
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.inner.failed_extractions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_captures: self.inner.total_captures.load(Ordering::Relaxed),
            successful_extractions: self.inner.successful_extractions.load(Ordering::Relaxed),
            failed_extractions: self.inner.failed_extractions.load(Ordering::Relaxed),
            started_at: self.inner.started_at,
            runtime_secs: self.inner.start_time.elapsed().as_secs_f64(),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Stats {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
