use anyhow::{bail, Context, Result};
use std::io;
use std::time::Duration;
use v4l::buffer::Type as BufType;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::Device;

use super::{Camera, CameraBackend, Frame};

const BUFFER_COUNT: u32 = 4;
// Bounds each read so a stop request is noticed even when the device stalls.
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// `/dev/video<N>` capture through V4L2 memory-mapped buffers.
pub struct V4lCameraBackend;

impl CameraBackend for V4lCameraBackend {
    fn open(&self, index: u32) -> Result<Box<dyn Camera>> {
        let device = Device::new(index as usize)
            .with_context(|| format!("failed to open /dev/video{index}"))?;
        let format = device
            .format()
            .with_context(|| format!("failed to query format of /dev/video{index}"))?;

        let mut stream: MmapStream<'static> =
            MmapStream::with_buffers(&device, BufType::VideoCapture, BUFFER_COUNT)
                .with_context(|| format!("failed to start stream on /dev/video{index}"))?;
        stream.set_timeout(READ_TIMEOUT);

        log::info!(
            "Opened /dev/video{index}: {}x{} {}",
            format.width,
            format.height,
            format.fourcc.str().unwrap_or("RAW")
        );
        Ok(Box::new(V4lCamera {
            stream: Some(stream),
            width: format.width,
            height: format.height,
        }))
    }
}

/// Frames are passed on in the device's native pixel format.
pub struct V4lCamera {
    stream: Option<MmapStream<'static>>,
    width: u32,
    height: u32,
}

impl Camera for V4lCamera {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(stream) = self.stream.as_mut() else {
            bail!("camera already released");
        };

        match stream.next() {
            Ok((buf, _meta)) if buf.is_empty() => Ok(None),
            Ok((buf, _meta)) => Ok(Some(Frame {
                width: self.width,
                height: self.height,
                data: buf.to_vec(),
            })),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(err) => Err(err).context("failed to dequeue frame"),
        }
    }

    fn release(&mut self) {
        // Dropping the stream unmaps the buffers and stops streaming.
        self.stream.take();
    }
}
