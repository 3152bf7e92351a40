mod session;
#[cfg(target_os = "linux")]
mod v4l_device;

pub use session::{CameraDevice, DeviceSession, SessionState};
#[cfg(target_os = "linux")]
pub use v4l_device::V4lCamera;

use crate::error::DeviceError;

/// Camera backend for this platform.
pub fn platform_camera() -> Result<Box<dyn CameraDevice>, DeviceError> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(V4lCamera::new()))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(DeviceError::Unsupported)
    }
}
