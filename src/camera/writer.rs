use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::Frame;

/// Persists captured frames. Encoding is up to the implementation.
pub trait FrameWriter: Send {
    fn write(&mut self, frame: &Frame) -> Result<()>;
    fn release(&mut self) -> Result<()>;
}

/// Length-prefixed raw container: per frame, little-endian `width`, `height`,
/// `len` as u32 followed by `len` bytes.
pub struct RawFrameWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    frames: u64,
}

impl RawFrameWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("failed to create recording {}", path.display()))?;
        Ok(Self {
            path,
            out: Some(BufWriter::new(file)),
            frames: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames
    }
}

impl FrameWriter for RawFrameWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let Some(out) = self.out.as_mut() else {
            anyhow::bail!("recording {} already released", self.path.display());
        };
        let len = u32::try_from(frame.data.len()).context("frame too large")?;
        out.write_all(&frame.width.to_le_bytes())?;
        out.write_all(&frame.height.to_le_bytes())?;
        out.write_all(&len.to_le_bytes())?;
        out.write_all(&frame.data)?;
        self.frames += 1;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if let Some(mut out) = self.out.take() {
            out.flush()
                .with_context(|| format!("failed to flush {}", self.path.display()))?;
        }
        Ok(())
    }
}
