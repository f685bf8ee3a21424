use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoEntry {
    pub title: String,
    pub source: String,
}

impl VideoEntry {
    pub fn new(title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Playback position of the first cue.
    pub first_cue_ms: u64,
    /// Playback time between consecutive cues.
    pub interval_ms: u64,
    /// How long a response is accepted after a cue.
    pub window_ms: u64,
    pub poll_interval_ms: u64,
    /// Sound file for the cue; a synthesized chime is used when absent.
    pub cue_sound: Option<PathBuf>,
    /// Play a short confirmation tone when a response key is pressed.
    pub confirm_sound: bool,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            first_cue_ms: 80_000,
            interval_ms: 40_000,
            window_ms: 10_000,
            poll_interval_ms: 100,
            cue_sound: None,
            confirm_sound: true,
        }
    }
}

impl ProbeSettings {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResponseKeys {
    pub focused: String,
    pub unfocused: String,
    pub skip: String,
}

impl Default for ResponseKeys {
    fn default() -> Self {
        Self {
            focused: "1".into(),
            unfocused: "2".into(),
            skip: "3".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub enabled: bool,
    /// Device indices `0..max_index` are probed.
    pub max_index: u32,
    /// Consecutive good frames a device must deliver to be selected.
    pub frames_required: u32,
    /// Delay after arming the recorder before calibration starts.
    pub warmup_ms: u64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_index: 10,
            frames_required: 5,
            warmup_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    pub command: Option<String>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub output_dir: PathBuf,
    pub playlist: Vec<VideoEntry>,
    /// Played before the playlist with probe reminders enabled.
    pub demo_video: Option<VideoEntry>,
    pub shuffle_playlist: bool,
    pub probe: ProbeSettings,
    pub keys: ResponseKeys,
    pub progress_poll_ms: u64,
    pub stop_timeout_ms: u64,
    pub camera: CameraSettings,
    pub player: CommandSettings,
    pub resolver: CommandSettings,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            playlist: default_playlist(),
            demo_video: None,
            shuffle_playlist: true,
            probe: ProbeSettings::default(),
            keys: ResponseKeys::default(),
            progress_poll_ms: 200,
            stop_timeout_ms: 5_000,
            camera: CameraSettings::default(),
            player: CommandSettings {
                command: Some("mpv".into()),
                args: vec!["--really-quiet".into()],
            },
            resolver: CommandSettings::default(),
        }
    }
}

impl ExperimentConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn progress_poll(&self) -> Duration {
        Duration::from_millis(self.progress_poll_ms.max(1))
    }

    /// Shrinks probe timings so a full cycle fits in a few seconds.
    pub fn apply_debug_overrides(&mut self) {
        self.probe.first_cue_ms = 5_000;
        self.probe.interval_ms = 15_000;
        self.probe.window_ms = 5_000;
        self.camera.warmup_ms = 0;
    }
}

fn default_playlist() -> Vec<VideoEntry> {
    vec![
        VideoEntry::new("Writing-in-the-Sciences", "https://youtu.be/J3p6wGzLi00"),
        VideoEntry::new("Intro-to-Organizations", "https://youtu.be/dQeqyoHQ0V4"),
        VideoEntry::new("Intro-to-Economic-Theories", "https://youtu.be/8yM_vw9xKnQ"),
        VideoEntry::new("Intro-to-AI", "https://youtu.be/bBaZ05WsTUM"),
        VideoEntry::new("Game-Theory", "https://youtu.be/o5vvcohd1Qg"),
        VideoEntry::new("What-is-Cryptography", "https://youtu.be/XnueMv0EUHQ"),
    ]
}

/// Loaded experiment config plus the file it came from.
///
/// A missing file is created with the defaults so the experimenter has a
/// complete template to edit. Debug overrides are applied after that and are
/// never written back.
pub struct ConfigStore {
    path: PathBuf,
    data: ExperimentConfig,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config in {}", path.display()))?
        } else {
            log::info!("No config at {}, writing defaults", path.display());
            let defaults = ExperimentConfig::default();
            persist(&path, &defaults)?;
            defaults
        };

        let debug_mode = std::env::var("PROBE_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            data.apply_debug_overrides();
        }

        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> ExperimentConfig {
        self.data.clone()
    }
}

fn persist(path: &Path, data: &ExperimentConfig) -> Result<()> {
    let serialized = serde_json::to_string_pretty(data)?;
    fs::write(path, serialized)
        .with_context(|| format!("Failed to write config to {}", path.display()))
}
