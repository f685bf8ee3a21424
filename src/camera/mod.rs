#[cfg(target_os = "linux")]
pub mod v4l2;
pub mod writer;

pub use writer::{FrameWriter, RawFrameWriter};

use anyhow::{bail, Result};
use log::{info, warn};

use crate::config::CameraSettings;

/// One captured frame, pixel layout as delivered by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// An opened capture device.
pub trait Camera: Send {
    /// Blocks until the next frame; `Ok(None)` is a dropped frame.
    fn read_frame(&mut self) -> Result<Option<Frame>>;
    fn release(&mut self);
}

/// Opens capture devices by index.
pub trait CameraBackend: Send + Sync {
    fn open(&self, index: u32) -> Result<Box<dyn Camera>>;
}

/// Backend for machines without a supported capture stack.
pub struct NoCameraBackend;

impl CameraBackend for NoCameraBackend {
    fn open(&self, index: u32) -> Result<Box<dyn Camera>> {
        bail!("no capture backend available for device {index}")
    }
}

/// The capture backend for this platform.
pub fn default_camera_backend() -> Box<dyn CameraBackend> {
    #[cfg(target_os = "linux")]
    {
        Box::new(v4l2::V4lCameraBackend)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(NoCameraBackend)
    }
}

/// Probes device indices in order and returns the first one that delivers
/// `frames_required` good frames in a row, already opened.
pub fn select_camera(
    backend: &dyn CameraBackend,
    settings: &CameraSettings,
) -> Option<(u32, Box<dyn Camera>)> {
    if !settings.enabled {
        info!("Camera recording disabled by config");
        return None;
    }

    for index in 0..settings.max_index {
        let mut camera = match backend.open(index) {
            Ok(camera) => camera,
            Err(_) => continue,
        };

        let good = (0..settings.frames_required)
            .take_while(|_| matches!(camera.read_frame(), Ok(Some(_))))
            .count() as u32;

        if good == settings.frames_required {
            info!("Selected camera {index}");
            return Some((index, camera));
        }

        warn!(
            "Camera {index} delivered {good}/{} frames, skipping",
            settings.frames_required
        );
        camera.release();
    }

    None
}
