//! V4L2 camera backend streaming through mmap buffers.

use image::{ImageFormat, RgbImage};
use log::{info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::CameraDevice;
use crate::error::DeviceError;

const BUFFER_COUNT: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelLayout {
    Mjpeg,
    Yuyv,
}

#[derive(Default)]
pub struct V4lCamera {
    // Field order matters: the stream must drop before the device.
    stream: Option<MmapStream<'static>>,
    device: Option<Device>,
    layout: Option<(PixelLayout, u32, u32)>,
}

impl V4lCamera {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CameraDevice for V4lCamera {
    fn open(&mut self, device_id: u32, resolution: (u32, u32)) -> Result<(), DeviceError> {
        self.release();

        let open_err = |message: String| DeviceError::Open { device_id, message };

        let device = Device::new(device_id as usize).map_err(|err| open_err(err.to_string()))?;
        let mut format = device.format().map_err(|err| open_err(err.to_string()))?;
        format.width = resolution.0;
        format.height = resolution.1;
        format.fourcc = FourCC::new(b"MJPG");

        let format = device
            .set_format(&format)
            .map_err(|err| open_err(err.to_string()))?;

        let layout = match &format.fourcc.repr {
            b"MJPG" => PixelLayout::Mjpeg,
            b"YUYV" => PixelLayout::Yuyv,
            other => {
                return Err(open_err(format!(
                    "unsupported pixel format {}",
                    String::from_utf8_lossy(other)
                )))
            }
        };

        if (format.width, format.height) != resolution {
            warn!(
                "camera {} negotiated {}x{} instead of {}x{}",
                device_id, format.width, format.height, resolution.0, resolution.1
            );
        }

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|err| open_err(err.to_string()))?;

        info!(
            "v4l2 stream ready on /dev/video{} ({:?} {}x{})",
            device_id, layout, format.width, format.height
        );

        self.layout = Some((layout, format.width, format.height));
        self.stream = Some(stream);
        self.device = Some(device);
        Ok(())
    }

    fn read(&mut self) -> Result<RgbImage, DeviceError> {
        let (Some(stream), Some((layout, width, height))) = (self.stream.as_mut(), self.layout)
        else {
            return Err(DeviceError::NotOpen);
        };

        let (buf, meta) = stream
            .next()
            .map_err(|err| DeviceError::Read(err.to_string()))?;
        let used = (meta.bytesused as usize).min(buf.len());
        let data = &buf[..used];

        match layout {
            PixelLayout::Mjpeg => image::load_from_memory_with_format(data, ImageFormat::Jpeg)
                .map(|img| img.to_rgb8())
                .map_err(|err| DeviceError::Decode(err.to_string())),
            PixelLayout::Yuyv => yuyv_to_rgb(data, width, height),
        }
    }

    fn release(&mut self) {
        self.stream = None;
        self.device = None;
        self.layout = None;
    }
}

fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<RgbImage, DeviceError> {
    let expected = width as usize * height as usize * 2;
    if data.len() < expected {
        return Err(DeviceError::Decode(format!(
            "short YUYV frame: {} of {} bytes",
            data.len(),
            expected
        )));
    }

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for chunk in data[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_pixel(y0, u, v));
        rgb.extend_from_slice(&yuv_pixel(y1, u, v));
    }

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| DeviceError::Decode("YUYV buffer size mismatch".into()))
}

fn yuv_pixel(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as f32 - 16.0;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let clamp = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    [
        clamp(1.164 * c + 1.596 * e),
        clamp(1.164 * c - 0.392 * d - 0.813 * e),
        clamp(1.164 * c + 2.017 * d),
    ]
}
