use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use image::codecs::jpeg::JpegEncoder;
use image::ImageError;

use crate::error::PersistenceError;
use crate::models::{CaptureEvent, Frame};

use super::motion::{MotionDetector, MotionGate};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// Decides whether a ready scene becomes a capture, and writes the still.
pub struct CaptureController {
    shots_dir: PathBuf,
    min_interval: Duration,
    jpeg_quality: u8,
    last_capture: Option<Instant>,
}

impl CaptureController {
    pub fn new(shots_dir: PathBuf, min_interval: Duration, jpeg_quality: u8) -> Self {
        Self {
            shots_dir,
            min_interval,
            jpeg_quality,
            last_capture: None,
        }
    }

    /// Persists `frame` when the gate is ready and the last successful
    /// capture is at least `min_interval` old. On success the gate's run is
    /// reset; on a write failure nothing advances so the next stable frame
    /// retries.
    pub fn maybe_capture<M: MotionDetector>(
        &mut self,
        frame: &Frame,
        gate: &mut MotionGate<M>,
    ) -> Option<CaptureEvent> {
        if !gate.is_ready() {
            return None;
        }

        if let Some(last) = self.last_capture {
            let elapsed = frame.captured_at.saturating_duration_since(last);
            if elapsed < self.min_interval {
                log_debug!(
                    "capture rate-limited ({}ms since last, need {}ms)",
                    elapsed.as_millis(),
                    self.min_interval.as_millis()
                );
                return None;
            }
        }

        let path = self.shot_path(frame);
        if let Err(err) = self.persist(frame, &path) {
            log_error!("{err}");
            return None;
        }

        gate.reset();
        self.last_capture = Some(frame.captured_at);
        log_info!("captured {}", path.display());
        Some(CaptureEvent::new(path, frame.wallclock))
    }

    pub fn last_capture(&self) -> Option<Instant> {
        self.last_capture
    }

    /// `shot_<epoch ms>.jpg`, with a `_<n>` suffix if that name is taken.
    fn shot_path(&self, frame: &Frame) -> PathBuf {
        let stem = format!("shot_{}", frame.wallclock.timestamp_millis());
        let mut path = self.shots_dir.join(format!("{stem}.jpg"));
        let mut n = 1;
        while path.exists() {
            path = self.shots_dir.join(format!("{stem}_{n}.jpg"));
            n += 1;
        }
        path
    }

    fn persist(&self, frame: &Frame, path: &Path) -> Result<(), PersistenceError> {
        let result = write_jpeg(frame, path, self.jpeg_quality);
        if result.is_err() {
            // Leave no truncated still behind.
            let _ = fs::remove_file(path);
        }
        result.map_err(|source| PersistenceError {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn write_jpeg(frame: &Frame, path: &Path, quality: u8) -> Result<(), ImageError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, quality).encode_image(&frame.image)?;
    writer.flush()?;
    Ok(())
}
