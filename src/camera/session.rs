use image::RgbImage;
use log::{info, warn};

use crate::error::DeviceError;
use crate::models::Frame;

/// Raw frame-grabbing primitives. Implementations own the OS handle.
pub trait CameraDevice: Send {
    fn open(&mut self, device_id: u32, resolution: (u32, u32)) -> Result<(), DeviceError>;
    fn read(&mut self) -> Result<RgbImage, DeviceError>;
    fn release(&mut self);
}

impl<T: CameraDevice + ?Sized> CameraDevice for Box<T> {
    fn open(&mut self, device_id: u32, resolution: (u32, u32)) -> Result<(), DeviceError> {
        (**self).open(device_id, resolution)
    }

    fn read(&mut self) -> Result<RgbImage, DeviceError> {
        (**self).read()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Open,
    /// Open, but the last reads failed this many times in a row.
    Degraded(u32),
}

/// Owns the camera handle lifecycle. Reads are never retried here; the
/// capture loop decides what a run of failures means.
pub struct DeviceSession<D: CameraDevice> {
    device: D,
    device_id: u32,
    resolution: (u32, u32),
    state: SessionState,
}

impl<D: CameraDevice> DeviceSession<D> {
    pub fn new(device: D, device_id: u32, resolution: (u32, u32)) -> Self {
        Self {
            device,
            device_id,
            resolution,
            state: SessionState::Closed,
        }
    }

    /// Opens (or reopens) the device in the configured capture mode.
    pub fn open(&mut self) -> Result<(), DeviceError> {
        if self.state != SessionState::Closed {
            self.device.release();
            self.state = SessionState::Closed;
        }

        self.device.open(self.device_id, self.resolution)?;
        self.state = SessionState::Open;
        info!(
            "camera {} opened at {}x{}",
            self.device_id, self.resolution.0, self.resolution.1
        );
        Ok(())
    }

    pub fn read(&mut self) -> Result<Frame, DeviceError> {
        if self.state == SessionState::Closed {
            return Err(DeviceError::NotOpen);
        }

        match self.device.read() {
            Ok(image) => {
                self.state = SessionState::Open;
                Ok(Frame::new(image))
            }
            Err(err) => {
                let failures = match self.state {
                    SessionState::Degraded(n) => n.saturating_add(1),
                    _ => 1,
                };
                self.state = SessionState::Degraded(failures);
                Err(err)
            }
        }
    }

    pub fn release(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.device.release();
        self.state = SessionState::Closed;
        info!("camera {} released", self.device_id);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != SessionState::Closed
    }

    pub fn consecutive_failures(&self) -> u32 {
        match self.state {
            SessionState::Degraded(n) => n,
            _ => 0,
        }
    }
}

impl<D: CameraDevice> Drop for DeviceSession<D> {
    fn drop(&mut self) {
        if self.is_open() {
            warn!("camera {} dropped while open; releasing", self.device_id);
            self.release();
        }
    }
}
