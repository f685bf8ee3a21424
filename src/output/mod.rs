pub mod archive;
pub mod clock;
pub mod log_file;

pub use archive::archive_session;
pub use clock::{SessionClock, Timestamp};
pub use log_file::LogWriter;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// File names inside a session's output directory.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create output dir {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn main_log(&self) -> PathBuf {
        self.root.join("main_log.txt")
    }

    pub fn activity_log(&self, video: &str) -> PathBuf {
        self.root.join(format!("activity_{}.txt", file_token(video)))
    }

    pub fn probe_log(&self, video: &str) -> PathBuf {
        self.root.join(format!("probe_{}.txt", file_token(video)))
    }

    pub fn frame_timeline(&self) -> PathBuf {
        self.root.join("video_timeline.txt")
    }

    pub fn recording(&self) -> PathBuf {
        self.root.join("recording.raw")
    }
}

fn file_token(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}
