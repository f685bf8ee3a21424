use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use super::resolver::PlayableSource;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Ended,
    Stopped,
    Error,
}

impl PlaybackState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlaybackState::Ended | PlaybackState::Stopped | PlaybackState::Error
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackProgress {
    pub state: PlaybackState,
    pub time_ms: u64,
    pub length_ms: Option<u64>,
}

/// Handle to the external video engine.
///
/// `progress` returning an error means the handle is no longer valid
/// (player released or crashed); pollers stop on it instead of retrying.
pub trait MediaPlayer: Send + Sync {
    fn play(&self, source: &PlayableSource) -> Result<()>;
    fn stop(&self);
    fn progress(&self) -> Result<PlaybackProgress>;
}

struct Running {
    child: Child,
    started: Instant,
    finished: Option<(PlaybackState, u64)>,
}

/// Runs each video in an external player process (mpv, vlc, ...).
///
/// Playback time is wall time since launch; the process exiting ends playback.
pub struct ProcessPlayer {
    program: String,
    args: Vec<String>,
    current: Mutex<Option<Running>>,
}

impl ProcessPlayer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            current: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Running>> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl MediaPlayer for ProcessPlayer {
    fn play(&self, source: &PlayableSource) -> Result<()> {
        self.stop();

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(&source.location)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to launch {} for {}", self.program, source.title))?;

        *self.lock() = Some(Running {
            child,
            started: Instant::now(),
            finished: None,
        });
        Ok(())
    }

    fn stop(&self) {
        if let Some(mut running) = self.lock().take() {
            if running.finished.is_none() {
                if let Err(err) = running.child.kill() {
                    log::warn!("Failed to kill player process: {err}");
                }
                let _ = running.child.wait();
            }
        }
    }

    fn progress(&self) -> Result<PlaybackProgress> {
        let mut guard = self.lock();
        let running = guard
            .as_mut()
            .ok_or_else(|| anyhow!("no media loaded"))?;

        if let Some((state, time_ms)) = running.finished {
            return Ok(PlaybackProgress {
                state,
                time_ms,
                length_ms: Some(time_ms),
            });
        }

        let time_ms = running.started.elapsed().as_millis() as u64;
        match running.child.try_wait() {
            Ok(None) => Ok(PlaybackProgress {
                state: PlaybackState::Playing,
                time_ms,
                length_ms: None,
            }),
            Ok(Some(status)) => {
                let state = if status.success() {
                    PlaybackState::Ended
                } else {
                    PlaybackState::Error
                };
                running.finished = Some((state, time_ms));
                Ok(PlaybackProgress {
                    state,
                    time_ms,
                    length_ms: Some(time_ms),
                })
            }
            Err(err) => bail!("player process lost: {err}"),
        }
    }
}

impl Drop for ProcessPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}
