use std::time::Instant;

use chrono::{DateTime, Utc};
use image::RgbImage;

/// One decoded camera frame. Dropped at the end of the loop iteration that
/// read it unless it gets captured.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: Instant,
    pub wallclock: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Instant::now(),
            wallclock: Utc::now(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("dimensions", &self.dimensions())
            .field("wallclock", &self.wallclock)
            .finish()
    }
}
