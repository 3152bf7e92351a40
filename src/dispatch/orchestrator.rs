use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::task::TaskTracker;

use crate::error::{DispatchError, JobError};
use crate::metrics::Stats;
use crate::models::CaptureEvent;

use super::worker::ExtractionWorker;

/// Bounded worker pool between the capture loop and the result store.
///
/// At most `max_workers` jobs run at once. A submission that finds every
/// slot taken waits for one to free up, which in turn stalls whoever feeds
/// the dispatcher. Results land in completion order, not capture order.
pub struct Dispatcher {
    worker: Arc<ExtractionWorker>,
    stats: Stats,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    max_workers: usize,
}

impl Dispatcher {
    pub fn new(worker: ExtractionWorker, max_workers: usize, stats: Stats) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            worker: Arc::new(worker),
            stats,
            permits: Arc::new(Semaphore::new(max_workers)),
            tracker: TaskTracker::new(),
            max_workers,
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Jobs accepted and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Accepts one capture for extraction. Waits while the pool is full.
    /// A capture that cannot be accepted is still counted, as a failure.
    pub async fn submit(&self, event: CaptureEvent) -> Result<(), DispatchError> {
        self.stats.record_capture();
        info!("capture received: {}", event.path.display());

        if self.tracker.is_closed() {
            return Err(self.reject(&event));
        }

        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return Err(self.reject(&event)),
        };

        let worker = Arc::clone(&self.worker);
        let stats = self.stats.clone();
        self.tracker.spawn(async move {
            let outcome = worker.process(&event).await;
            drop(permit);
            complete(&stats, &event, outcome);
        });
        Ok(())
    }

    /// Feeds every event from `events` into the pool until the sending side
    /// (the capture loop) hangs up.
    pub async fn run_intake(&self, mut events: mpsc::Receiver<CaptureEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(err) = self.submit(event).await {
                warn!("capture not submitted: {err}");
            }
        }
        info!("capture channel closed; intake finished");
    }

    /// Stops accepting work. With `drain` the call returns only once every
    /// accepted job has finished and been counted.
    pub async fn shutdown(&self, drain: bool) {
        self.tracker.close();
        self.permits.close();

        if drain {
            let pending = self.tracker.len();
            if pending > 0 {
                info!("waiting for {pending} extraction job(s) to finish");
            }
            self.tracker.wait().await;
            info!("all extraction jobs finished");
        } else if !self.tracker.is_empty() {
            warn!(
                "shutting down without drain; {} job(s) still running",
                self.tracker.len()
            );
        }
    }

    fn reject(&self, event: &CaptureEvent) -> DispatchError {
        self.stats.record_failure();
        error!(
            "dispatcher closed, {} will not be extracted",
            event.path.display()
        );
        DispatchError::Closed
    }
}

/// Single completion path for every job; the only place job outcomes touch
/// the counters.
fn complete(stats: &Stats, event: &CaptureEvent, outcome: Result<usize, JobError>) {
    match outcome {
        Ok(row) => {
            stats.record_success();
            info!("{} stored at row {}", event.path.display(), row);
        }
        Err(JobError::Store(err)) => {
            stats.record_failure();
            error!(
                "extraction of {} succeeded but the row was lost: {err}",
                event.path.display()
            );
        }
        Err(err) => {
            stats.record_failure();
            error!("extraction failed for {}: {err}", event.path.display());
        }
    }
    info!("stats - {}", stats.snapshot());
}
