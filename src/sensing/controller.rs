use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::camera::CameraDevice;

use super::loop_worker::{CaptureLoop, LoopStatus};
use super::motion::MotionDetector;

/// Owns the capture loop's blocking thread and its cancellation token.
pub struct SensingController {
    handle: Option<JoinHandle<LoopStatus>>,
    cancel_token: CancellationToken,
}

impl SensingController {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            handle: None,
            cancel_token,
        }
    }

    /// Moves `capture_loop` onto a blocking thread. The loop must have been
    /// built with this controller's token.
    pub fn start_sensing<D, M>(&mut self, capture_loop: CaptureLoop<D, M>) -> Result<()>
    where
        D: CameraDevice + 'static,
        M: MotionDetector + 'static,
    {
        if self.handle.is_some() {
            bail!("sensing already active");
        }

        let handle = tokio::task::spawn_blocking(move || capture_loop.run());
        self.handle = Some(handle);
        info!("capture loop thread started");
        Ok(())
    }

    /// Signals the loop to stop after its current frame read.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Waits for the loop to exit on its own or after `cancel`.
    pub async fn join(&mut self) -> Result<Option<LoopStatus>> {
        match self.handle.take() {
            Some(handle) => handle
                .await
                .context("capture loop thread failed to join")
                .map(Some),
            None => Ok(None),
        }
    }
}
