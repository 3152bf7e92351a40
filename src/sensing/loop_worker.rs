use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::camera::{CameraDevice, DeviceSession};
use crate::models::CaptureEvent;

use super::capture::CaptureController;
use super::motion::{MotionDetector, MotionGate};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

// Import the logging macros (exported at crate root)
use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoopState {
    Disconnected,
    Running,
    Reconnecting,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopStatus {
    pub state: LoopState,
    pub frame_count: u64,
    pub capture_count: u64,
    pub stable_run: u32,
    pub last_capture_at: Option<DateTime<Utc>>,
    pub device_open: bool,
    /// Set when the loop stopped because the camera could not be (re)opened.
    pub device_error: Option<String>,
}

/// Drives one camera through read -> classify -> capture until cancelled or
/// the device is lost for good. Runs on a blocking thread; a full capture
/// channel stalls it.
pub struct CaptureLoop<D: CameraDevice, M: MotionDetector> {
    session: DeviceSession<D>,
    gate: MotionGate<M>,
    controller: CaptureController,
    failure_budget: u32,
    events: mpsc::Sender<CaptureEvent>,
    cancel_token: CancellationToken,
    state: LoopState,
    frame_count: u64,
    capture_count: u64,
    last_capture_at: Option<DateTime<Utc>>,
    device_error: Option<String>,
}

impl<D: CameraDevice, M: MotionDetector> CaptureLoop<D, M> {
    pub fn new(
        session: DeviceSession<D>,
        gate: MotionGate<M>,
        controller: CaptureController,
        failure_budget: u32,
        events: mpsc::Sender<CaptureEvent>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            session,
            gate,
            controller,
            failure_budget: failure_budget.max(1),
            events,
            cancel_token,
            state: LoopState::Disconnected,
            frame_count: 0,
            capture_count: 0,
            last_capture_at: None,
            device_error: None,
        }
    }

    /// Runs until `Stopped`, then releases the device.
    pub fn run(mut self) -> LoopStatus {
        log_info!("capture loop starting");
        while self.tick() != LoopState::Stopped {}
        self.session.release();
        log_info!(
            "capture loop stopped after {} frames, {} captures",
            self.frame_count,
            self.capture_count
        );
        self.status()
    }

    /// One loop iteration. Cancellation is observed here, at most once per
    /// frame read.
    pub fn tick(&mut self) -> LoopState {
        if self.cancel_token.is_cancelled() && self.state != LoopState::Stopped {
            log_info!("capture loop cancelled");
            self.state = LoopState::Stopped;
        }

        self.state = match self.state {
            LoopState::Disconnected => match self.session.open() {
                Ok(()) => LoopState::Running,
                Err(err) => {
                    log_error!("camera open failed: {err}");
                    self.device_error = Some(err.to_string());
                    LoopState::Stopped
                }
            },
            LoopState::Reconnecting => match self.session.open() {
                Ok(()) => {
                    log_info!("camera reconnected");
                    LoopState::Running
                }
                Err(err) => {
                    log_error!("camera reconnect failed, giving up: {err}");
                    self.device_error = Some(err.to_string());
                    LoopState::Stopped
                }
            },
            LoopState::Running => self.step(),
            LoopState::Stopped => LoopState::Stopped,
        };
        self.state
    }

    fn step(&mut self) -> LoopState {
        let frame = match self.session.read() {
            Ok(frame) => frame,
            Err(err) => {
                let failures = self.session.consecutive_failures();
                log_warn!(
                    "frame read failed ({}/{}): {err}",
                    failures,
                    self.failure_budget
                );
                if failures >= self.failure_budget {
                    log_error!("read failure budget exhausted, reconnecting camera");
                    return LoopState::Reconnecting;
                }
                return LoopState::Running;
            }
        };

        self.frame_count += 1;
        self.gate.classify(&frame);

        let Some(event) = self.controller.maybe_capture(&frame, &mut self.gate) else {
            return LoopState::Running;
        };

        self.capture_count += 1;
        self.last_capture_at = Some(event.timestamp);

        // Blocks while the dispatcher is saturated.
        if let Err(err) = self.events.blocking_send(event) {
            log_error!(
                "dispatcher is gone, {} was not submitted; stopping capture",
                err.0.path.display()
            );
            return LoopState::Stopped;
        }
        LoopState::Running
    }

    pub fn status(&self) -> LoopStatus {
        LoopStatus {
            state: self.state,
            frame_count: self.frame_count,
            capture_count: self.capture_count,
            stable_run: self.gate.stable_run(),
            last_capture_at: self.last_capture_at,
            device_open: self.session.is_open(),
            device_error: self.device_error.clone(),
        }
    }
}
