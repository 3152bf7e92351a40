mod capture;
mod frame;
mod record;

pub use capture::CaptureEvent;
pub use frame::Frame;
pub use record::{ExtractionRecord, EXTRACTED_TIME_COLUMN, IMAGE_PATH_COLUMN};
