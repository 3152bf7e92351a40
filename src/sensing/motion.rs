use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::error::DetectionError;
use crate::models::Frame;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Per-pixel intensity change that counts as foreground.
const FOREGROUND_DELTA: f32 = 25.0;
/// How fast the background absorbs the current frame.
const LEARNING_RATE: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Stable,
    Moving,
}

/// Reduces a detection-sized grayscale frame to a foreground pixel count.
pub trait MotionDetector: Send {
    fn foreground_pixel_count(&mut self, small: &GrayImage) -> Result<u32, DetectionError>;
}

/// Running-average background model.
#[derive(Debug, Default)]
pub struct BackgroundModel {
    background: Option<Vec<f32>>,
    dimensions: (u32, u32),
}

impl BackgroundModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MotionDetector for BackgroundModel {
    fn foreground_pixel_count(&mut self, small: &GrayImage) -> Result<u32, DetectionError> {
        let dimensions = small.dimensions();
        if dimensions.0 == 0 || dimensions.1 == 0 {
            return Err(DetectionError::EmptyFrame);
        }

        let Some(background) = self.background.as_mut() else {
            // The first frame only seeds the model; report it as all motion.
            self.background = Some(small.as_raw().iter().map(|&p| p as f32).collect());
            self.dimensions = dimensions;
            return Ok(dimensions.0.saturating_mul(dimensions.1));
        };

        if dimensions != self.dimensions {
            return Err(DetectionError::SizeMismatch {
                expected: self.dimensions,
                actual: dimensions,
            });
        }

        let mut foreground = 0u32;
        for (bg, &px) in background.iter_mut().zip(small.as_raw()) {
            let px = px as f32;
            if (px - *bg).abs() > FOREGROUND_DELTA {
                foreground += 1;
            }
            *bg += LEARNING_RATE * (px - *bg);
        }
        Ok(foreground)
    }
}

/// Tracks how many frames in a row were motion-free and says when the scene
/// has settled long enough to capture.
pub struct MotionGate<M: MotionDetector> {
    detector: M,
    detect_res: (u32, u32),
    motion_threshold: u32,
    trigger: u32,
    stable_run: u32,
}

impl<M: MotionDetector> MotionGate<M> {
    pub fn new(detector: M, detect_res: (u32, u32), motion_threshold: u32, trigger: u32) -> Self {
        Self {
            detector,
            detect_res,
            motion_threshold,
            trigger,
            stable_run: 0,
        }
    }

    /// Classifies `frame` and updates the stability run. A detector failure
    /// counts as motion so uncertain input never leads to a capture.
    pub fn classify(&mut self, frame: &Frame) -> Classification {
        let small = self.reduce(frame);
        let classification = match self.detector.foreground_pixel_count(&small) {
            Ok(count) if count < self.motion_threshold => Classification::Stable,
            Ok(count) => {
                log_debug!("motion: {} foreground pixels", count);
                Classification::Moving
            }
            Err(err) => {
                log_warn!("motion detection failed, treating frame as moving: {err}");
                Classification::Moving
            }
        };
        self.record(classification);
        classification
    }

    pub(crate) fn record(&mut self, classification: Classification) {
        match classification {
            Classification::Stable => self.stable_run = self.stable_run.saturating_add(1),
            Classification::Moving => self.stable_run = 0,
        }
    }

    /// True from the frame the run reaches the trigger length until the next
    /// reset.
    pub fn is_ready(&self) -> bool {
        self.stable_run >= self.trigger
    }

    pub fn reset(&mut self) {
        self.stable_run = 0;
    }

    pub fn stable_run(&self) -> u32 {
        self.stable_run
    }

    fn reduce(&self, frame: &Frame) -> GrayImage {
        let (w, h) = self.detect_res;
        if frame.dimensions() == self.detect_res {
            imageops::grayscale(&frame.image)
        } else {
            let small = imageops::resize(&frame.image, w, h, FilterType::Triangle);
            imageops::grayscale(&small)
        }
    }
}
