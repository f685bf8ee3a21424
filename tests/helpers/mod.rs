//! Shared fakes for the integration tests: a clock-driven player, a scripted
//! resolver, a recording cue player and a scripted front end.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use probecast_lib::audio::{Cue, CuePlayer};
use probecast_lib::camera::NoCameraBackend;
use probecast_lib::config::{CameraSettings, ExperimentConfig, ProbeSettings, VideoEntry};
use probecast_lib::frontend::{DisplayInfo, Screen, UiEvent, UiUpdate};
use probecast_lib::input::InputHub;
use probecast_lib::media::{
    MediaPlayer, PlayableSource, PlaybackProgress, PlaybackState, SourceResolver,
};
use probecast_lib::output::SessionClock;
use probecast_lib::session::{SessionDeps, UiChannels};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Player whose position advances with the tokio clock.
/// Sources named `len:<ms>` play for that long; anything else plays 1s.
pub struct FakePlayer {
    current: Mutex<Option<(Instant, u64)>>,
}

impl FakePlayer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(None),
        })
    }
}

impl MediaPlayer for FakePlayer {
    fn play(&self, source: &PlayableSource) -> Result<()> {
        let length_ms = source
            .location
            .strip_prefix("len:")
            .and_then(|ms| ms.parse().ok())
            .unwrap_or(1_000);
        *self.current.lock().unwrap() = Some((Instant::now(), length_ms));
        Ok(())
    }

    fn stop(&self) {
        self.current.lock().unwrap().take();
    }

    fn progress(&self) -> Result<PlaybackProgress> {
        let guard = self.current.lock().unwrap();
        let (started, length_ms) = guard.ok_or_else(|| anyhow!("released"))?;
        let time_ms = (started.elapsed().as_millis() as u64).min(length_ms);
        let state = if time_ms >= length_ms {
            PlaybackState::Ended
        } else {
            PlaybackState::Playing
        };
        Ok(PlaybackProgress {
            state,
            time_ms,
            length_ms: Some(length_ms),
        })
    }
}

/// Wraps a player whose `play` takes a while to return, like a process that
/// is slow to load its media.
pub struct SlowStartPlayer {
    inner: Arc<FakePlayer>,
    delay: Duration,
}

impl SlowStartPlayer {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: FakePlayer::new(),
            delay,
        })
    }
}

impl MediaPlayer for SlowStartPlayer {
    fn play(&self, source: &PlayableSource) -> Result<()> {
        std::thread::sleep(self.delay);
        self.inner.play(source)
    }

    fn stop(&self) {
        self.inner.stop();
    }

    fn progress(&self) -> Result<PlaybackProgress> {
        self.inner.progress()
    }
}

/// Resolves every source except the literal `fail`.
pub struct ScriptedResolver;

impl SourceResolver for ScriptedResolver {
    fn resolve(&self, video: &VideoEntry) -> Result<PlayableSource> {
        if video.source == "fail" {
            bail!("no stream for {}", video.title);
        }
        Ok(PlayableSource {
            title: video.title.clone(),
            location: video.source.clone(),
        })
    }
}

/// Reports every cue on a channel.
pub struct RecordingCue {
    tx: mpsc::UnboundedSender<Cue>,
}

impl RecordingCue {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Cue>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl CuePlayer for RecordingCue {
    fn play(&self, cue: Cue) {
        let _ = self.tx.send(cue);
    }
}

/// Blocks the calling thread on every cue, so the worker that plays it
/// cannot observe a stop request in time.
pub struct BlockingCue {
    pub hold: Duration,
}

impl CuePlayer for BlockingCue {
    fn play(&self, _cue: Cue) {
        std::thread::sleep(self.hold);
    }
}

pub fn test_config(output_dir: &Path, playlist: Vec<VideoEntry>) -> ExperimentConfig {
    ExperimentConfig {
        output_dir: output_dir.to_path_buf(),
        playlist,
        demo_video: None,
        shuffle_playlist: false,
        probe: ProbeSettings {
            first_cue_ms: 60_000,
            interval_ms: 60_000,
            window_ms: 10_000,
            poll_interval_ms: 10,
            cue_sound: None,
            confirm_sound: false,
        },
        progress_poll_ms: 10,
        stop_timeout_ms: 2_000,
        camera: CameraSettings {
            enabled: false,
            ..CameraSettings::default()
        },
        ..ExperimentConfig::default()
    }
}

pub fn test_deps(player: Arc<dyn MediaPlayer>, cue: Arc<dyn CuePlayer>) -> SessionDeps {
    SessionDeps {
        player,
        resolver: Arc::new(ScriptedResolver),
        cue,
        cameras: Box::new(NoCameraBackend),
        input: InputHub::new(SessionClock::new()),
    }
}

/// Front end that clicks through every screen and returns all updates it saw.
pub fn scripted_frontend(participant: &str) -> (UiChannels, JoinHandle<Vec<UiUpdate>>) {
    let (event_tx, event_rx) = mpsc::channel(32);
    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    let participant = participant.to_string();

    let handle = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(update) = update_rx.recv().await {
            let reply = match &update {
                UiUpdate::ShowScreen(Screen::Welcome) => {
                    Some(UiEvent::ParticipantSubmitted(participant.clone()))
                }
                UiUpdate::ShowScreen(Screen::Calibration) => Some(UiEvent::Calibrated(DisplayInfo {
                    width_mm: 344,
                    height_mm: 194,
                    resolution: (1920, 1080),
                    inner_area: (1920, 1040),
                    calibration_radius: 10,
                })),
                UiUpdate::ShowScreen(Screen::Player) | UiUpdate::NextEnabled(true) => {
                    Some(UiEvent::StartVideo)
                }
                _ => None,
            };
            let finished = matches!(update, UiUpdate::Finished { .. });
            seen.push(update);

            if let Some(event) = reply {
                // The controller may already be finishing.
                let _ = event_tx.send(event).await;
            }
            if finished {
                break;
            }
        }
        seen
    });

    (
        UiChannels {
            events: event_rx,
            updates: update_tx,
        },
        handle,
    )
}

/// Field part of every record line in `path`.
pub fn read_records(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter_map(|line| line.split_once(',').map(|(_, rest)| rest.to_string()))
        .collect()
}

/// Timestamps of every record line in `path`.
pub fn read_timestamps(path: &Path) -> Vec<f64> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter_map(|line| line.split(',').next()?.parse().ok())
        .collect()
}

pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30);
