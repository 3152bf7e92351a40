pub mod capture;
pub mod controller;
pub mod loop_worker;
pub mod motion;

pub use capture::CaptureController;
pub use controller::SensingController;
pub use loop_worker::{CaptureLoop, LoopState, LoopStatus};
pub use motion::{BackgroundModel, Classification, MotionDetector, MotionGate};
