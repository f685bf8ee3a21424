use anyhow::{Context, Result};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::clock::{SessionClock, Timestamp};

/// Append-only, timestamp-prefixed record file with a single owner.
///
/// Not `Clone`: a log file has exactly one writer for its whole lifetime.
pub struct LogWriter {
    path: PathBuf,
    clock: SessionClock,
    out: BufWriter<File>,
}

impl LogWriter {
    pub fn create(path: impl AsRef<Path>, clock: SessionClock) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;

        Ok(Self {
            path,
            clock,
            out: BufWriter::new(file),
        })
    }

    /// Writes `"<now>,<record>"`.
    pub fn record(&mut self, record: fmt::Arguments<'_>) -> Result<Timestamp> {
        let now = self.clock.now();
        self.record_at(now, record)?;
        Ok(now)
    }

    /// Writes a record stamped with a timestamp taken by the producer.
    pub fn record_at(&mut self, at: Timestamp, record: fmt::Arguments<'_>) -> Result<()> {
        writeln!(self.out, "{at:.6},{record}")
            .with_context(|| format!("failed to append to {}", self.path.display()))
    }

    /// Bare timestamp line, used by the frame timeline.
    pub fn stamp(&mut self, at: Timestamp) -> Result<()> {
        writeln!(self.out, "{at:.6}")
            .with_context(|| format!("failed to append to {}", self.path.display()))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out
            .flush()
            .with_context(|| format!("failed to flush {}", self.path.display()))
    }

    /// Flushes and closes the file.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if let Err(err) = self.out.flush() {
            log::error!("Failed to flush {} on drop: {err}", self.path.display());
        }
    }
}

/// Parses a record line back into `(timestamp, fields)`.
pub fn parse_record(line: &str) -> Option<(Timestamp, &str)> {
    let (ts, rest) = line.split_once(',').unwrap_or((line, ""));
    ts.parse::<f64>().ok().map(|ts| (ts, rest))
}
