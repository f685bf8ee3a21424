use std::{fmt, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::{
    audio::CuePlayer,
    camera::{select_camera, CameraBackend, RawFrameWriter},
    config::ExperimentConfig,
    frontend::{DisplayInfo, Screen, UiEvent, UiUpdate},
    input::InputHub,
    media::{MediaPlayer, SourceResolver},
    output::{archive_session, LogWriter, OutputLayout, SessionClock},
    workers::{
        spawn_activity_logger, spawn_probe_scheduler, spawn_progress_poller, spawn_recorder,
        ActivityLoggerParams, FinishOutcome, ProbeSchedulerParams, ProgressPollerParams,
        RecorderParams, WorkerHandle,
    },
};

use super::state::{Phase, PlaylistItem, SessionAction, SessionState};

/// External collaborators the controller drives.
pub struct SessionDeps {
    pub player: Arc<dyn MediaPlayer>,
    pub resolver: Arc<dyn SourceResolver>,
    pub cue: Arc<dyn CuePlayer>,
    pub cameras: Box<dyn CameraBackend>,
    pub input: InputHub,
}

/// Channels to and from the front end.
pub struct UiChannels {
    pub events: mpsc::Receiver<UiEvent>,
    pub updates: mpsc::UnboundedSender<UiUpdate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: String,
    pub phase: Phase,
    pub participant: Option<String>,
    pub output_dir: PathBuf,
    pub archive: Option<PathBuf>,
    pub played: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// The three workers bound to one video.
struct VideoWorkers {
    title: String,
    activity: WorkerHandle,
    probe: WorkerHandle,
    progress: WorkerHandle,
}

pub struct SessionController {
    config: ExperimentConfig,
    deps: SessionDeps,
    ui_events: mpsc::Receiver<UiEvent>,
    ui: mpsc::UnboundedSender<UiUpdate>,
    clock: SessionClock,
    session_id: String,
    layout: OutputLayout,
    main_log: Option<LogWriter>,
    state: SessionState,
    recorder: Option<WorkerHandle>,
    video_workers: Option<VideoWorkers>,
    // A start request that raced the end of the previous video.
    start_pending: bool,
    played: Vec<String>,
    failed: Vec<String>,
}

impl SessionController {
    pub fn new(config: ExperimentConfig, deps: SessionDeps, ui: UiChannels) -> Result<Self> {
        let session_id = Uuid::new_v4().to_string();
        let layout = OutputLayout::create(config.output_dir.join(format!("session-{session_id}")))?;
        let clock = deps.input.clock();
        let main_log = LogWriter::create(layout.main_log(), clock)?;

        Ok(Self {
            config,
            deps,
            ui_events: ui.events,
            ui: ui.updates,
            clock,
            session_id,
            layout,
            main_log: Some(main_log),
            state: SessionState::default(),
            recorder: None,
            video_workers: None,
            start_pending: false,
            played: Vec::new(),
            failed: Vec::new(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Runs the whole session. Failures degrade instead of propagating, so this
    /// always ends in `Finish` or `Error` with workers stopped.
    pub async fn run(mut self) -> SessionReport {
        info!("Session {} starting", self.session_id);

        if let Err(err) = self.drive().await {
            error!("Session {} failed: {err:?}", self.session_id);
            self.log_main(format_args!("error,{}", err));
            self.advance(SessionAction::Fail);
        }

        self.shutdown().await;

        if !self.state.phase.is_terminal() {
            self.advance(SessionAction::Abort);
        }

        if let Some(log) = self.main_log.take() {
            if let Err(err) = log.close() {
                error!("Failed to close main log: {err:?}");
            }
        }

        let archive = match self.state.participant.as_deref() {
            Some(participant) => match archive_session(self.layout.root(), participant) {
                Ok(path) => Some(path),
                Err(err) => {
                    error!("Failed to archive session {}: {err:?}", self.session_id);
                    None
                }
            },
            None => {
                warn!("No participant id entered; skipping archive");
                None
            }
        };

        self.send_ui(UiUpdate::ShowScreen(Screen::Finished));
        self.send_ui(UiUpdate::Finished {
            archive: archive.clone(),
        });
        info!("Session {} ended in {:?}", self.session_id, self.state.phase);

        SessionReport {
            session_id: self.session_id,
            phase: self.state.phase,
            participant: self.state.participant,
            output_dir: self.layout.root().to_path_buf(),
            archive,
            played: self.played,
            failed: self.failed,
        }
    }

    async fn drive(&mut self) -> Result<()> {
        // Setup
        self.log_main(format_args!("phase,{}", Phase::Setup.name()));
        self.send_ui(UiUpdate::ShowScreen(Screen::Welcome));
        let camera = select_camera(self.deps.cameras.as_ref(), &self.config.camera);
        match &camera {
            Some((index, _)) => self.log_main(format_args!("camera,{index}")),
            None => {
                info!("Camera not found; continuing without recording");
                self.log_main(format_args!("camera,none"));
                self.send_ui(UiUpdate::CameraUnavailable);
            }
        }

        let Some(participant) = self.wait_for_participant().await else {
            return Ok(());
        };
        self.transition(SessionAction::SubmitParticipant)?;
        self.log_main(format_args!("participant,{participant}"));
        self.state.playlist = self.build_playlist(&participant);
        self.state.participant = Some(participant);
        let titles = self
            .state
            .playlist
            .iter()
            .map(|item| item.video.title.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.log_main(format_args!("playlist,{titles}"));

        // Camera check: the recorder spans the whole session.
        if let Some((_, device)) = camera {
            let recorder = spawn_recorder(RecorderParams {
                camera: device,
                writer: Box::new(RawFrameWriter::create(self.layout.recording())?),
                timeline: LogWriter::create(self.layout.frame_timeline(), self.clock)?,
                clock: self.clock,
            });
            recorder.execute();
            self.recorder = Some(recorder);
            tokio::time::sleep(Duration::from_millis(self.config.camera.warmup_ms)).await;
        }
        self.transition(SessionAction::ConfirmCamera)?;

        // Calibration
        self.send_ui(UiUpdate::ShowScreen(Screen::Calibration));
        let Some(display) = self.wait_for_calibration().await else {
            return Ok(());
        };
        self.record_display(&display);

        // Playback
        self.send_ui(UiUpdate::ShowScreen(Screen::Player));
        while let Some(item) = self.state.next_video().cloned() {
            if self.wait_for_start().await == Flow::Quit {
                return Ok(());
            }

            let action = if item.demo {
                SessionAction::StartDemo
            } else {
                SessionAction::StartMain
            };
            self.transition(action)?;

            let done = self.start_video(&item).await?;
            self.state.video_index += 1;

            if let Some(done) = done {
                if self.wait_for_playback(done).await == Flow::Quit {
                    return Ok(());
                }
            }
        }

        self.transition(SessionAction::Complete)?;
        Ok(())
    }

    /// Tears down the previous video's workers, resolves the source, starts
    /// fresh workers and then playback. `None` means the video failed.
    async fn start_video(&mut self, item: &PlaylistItem) -> Result<Option<watch::Receiver<bool>>> {
        self.teardown_video_workers().await;
        self.deps.player.stop();

        let title = item.video.title.clone();
        self.send_ui(UiUpdate::NextEnabled(false));
        self.send_ui(UiUpdate::NowPlaying {
            title: title.clone(),
            index: self.state.video_index,
            total: self.state.playlist.len(),
        });

        let resolver = Arc::clone(&self.deps.resolver);
        let video = item.video.clone();
        let resolved = tokio::task::spawn_blocking(move || resolver.resolve(&video))
            .await
            .context("source resolver panicked")
            .and_then(|res| res);
        let source = match resolved {
            Ok(source) => source,
            Err(err) => {
                warn!("Failed to resolve {title}: {err:?}");
                self.playback_failed(&title);
                return Ok(None);
            }
        };

        let (probe_tx, probe_rx) = mpsc::unbounded_channel();
        let activity = spawn_activity_logger(
            &self.deps.input,
            ActivityLoggerParams {
                video: title.clone(),
                log: LogWriter::create(self.layout.activity_log(&title), self.clock)?,
                keys: self.config.keys.clone(),
                probe_tx,
                cue: self
                    .config
                    .probe
                    .confirm_sound
                    .then(|| Arc::clone(&self.deps.cue)),
            },
        );
        let probe = spawn_probe_scheduler(ProbeSchedulerParams {
            video: title.clone(),
            log: LogWriter::create(self.layout.probe_log(&title), self.clock)?,
            settings: self.config.probe.clone(),
            clock: self.clock,
            player: Arc::clone(&self.deps.player),
            cue: Arc::clone(&self.deps.cue),
            probe_rx,
            reminders: item.demo.then(|| self.ui.clone()),
        });
        let (progress, done) = spawn_progress_poller(ProgressPollerParams {
            video: title.clone(),
            player: Arc::clone(&self.deps.player),
            poll_interval: self.config.progress_poll(),
            ui: self.ui.clone(),
        });

        // Input is captured from the moment the video is requested.
        activity.execute();
        let workers = VideoWorkers {
            title: title.clone(),
            activity,
            probe,
            progress,
        };

        if let Err(err) = self.deps.player.play(&source) {
            warn!("Player failed on {title}: {err:?}");
            self.video_workers = Some(workers);
            self.teardown_video_workers().await;
            self.playback_failed(&title);
            return Ok(None);
        }

        // Both poll the player, which only has media once `play` returned.
        workers.probe.execute();
        workers.progress.execute();
        self.video_workers = Some(workers);

        info!("Playing {title} from {}", source.location);
        self.log_main(format_args!("play,{title},Start"));
        self.played.push(title);
        Ok(Some(done))
    }

    fn playback_failed(&mut self, title: &str) {
        self.log_main(format_args!("play,{title},Fail"));
        self.failed.push(title.to_string());
        self.send_ui(UiUpdate::PlaybackFailed {
            title: title.to_string(),
        });
        self.send_ui(UiUpdate::NextEnabled(true));
    }

    /// Stops the activity logger first so the next one never overlaps it.
    async fn teardown_video_workers(&mut self) {
        let Some(mut workers) = self.video_workers.take() else {
            return;
        };
        let timeout = self.config.stop_timeout();
        debug!("Tearing down workers for {}", workers.title);

        for worker in [
            &mut workers.activity,
            &mut workers.probe,
            &mut workers.progress,
        ] {
            if worker.finish(timeout).await == FinishOutcome::TimedOut {
                let name = worker.name().to_string();
                self.log_main(format_args!("worker,{name},timeout"));
            }
        }
    }

    async fn shutdown(&mut self) {
        self.teardown_video_workers().await;
        self.deps.player.stop();

        if let Some(mut recorder) = self.recorder.take() {
            if recorder.finish(self.config.stop_timeout()).await == FinishOutcome::TimedOut {
                self.log_main(format_args!("worker,recorder,timeout"));
            }
        }
    }

    async fn wait_for_playback(&mut self, mut done: watch::Receiver<bool>) -> Flow {
        loop {
            let event = tokio::select! {
                biased;
                // An error means the poller is gone, which also ends the video.
                _ = done.wait_for(|finished| *finished) => return Flow::Continue,
                event = self.ui_events.recv() => event,
            };

            match self.filter_event(event) {
                None => return Flow::Quit,
                Some(UiEvent::StartVideo) if *done.borrow() => {
                    self.start_pending = true;
                    return Flow::Continue;
                }
                Some(other) => debug!("Ignoring {other:?} during playback"),
            }
        }
    }

    async fn wait_for_participant(&mut self) -> Option<String> {
        loop {
            match self.next_event().await? {
                UiEvent::ParticipantSubmitted(id) if !id.trim().is_empty() => {
                    return Some(id.trim().to_string())
                }
                other => debug!("Ignoring {other:?} before participant id"),
            }
        }
    }

    async fn wait_for_calibration(&mut self) -> Option<DisplayInfo> {
        loop {
            match self.next_event().await? {
                UiEvent::Calibrated(display) => return Some(display),
                other => debug!("Ignoring {other:?} during calibration"),
            }
        }
    }

    async fn wait_for_start(&mut self) -> Flow {
        if std::mem::take(&mut self.start_pending) {
            return Flow::Continue;
        }
        loop {
            match self.next_event().await {
                Some(UiEvent::StartVideo) => return Flow::Continue,
                Some(other) => debug!("Ignoring {other:?} before video start"),
                None => return Flow::Quit,
            }
        }
    }

    /// Next event that needs a decision; `None` means quit.
    async fn next_event(&mut self) -> Option<UiEvent> {
        loop {
            let event = self.ui_events.recv().await;
            match self.filter_event(event) {
                Some(UiEvent::FocusChanged(_)) => continue,
                other => return other,
            }
        }
    }

    /// Handles events that are valid in every phase.
    fn filter_event(&mut self, event: Option<UiEvent>) -> Option<UiEvent> {
        match event {
            Some(UiEvent::FocusChanged(focused)) => {
                self.log_main(format_args!("focus,{focused}"));
                Some(UiEvent::FocusChanged(focused))
            }
            Some(UiEvent::Quit) | None => {
                info!("Quit requested in phase {:?}", self.state.phase);
                None
            }
            other => other,
        }
    }

    fn build_playlist(&self, participant: &str) -> Vec<PlaylistItem> {
        let mut main: Vec<PlaylistItem> = self
            .config
            .playlist
            .iter()
            .cloned()
            .map(|video| PlaylistItem { video, demo: false })
            .collect();

        if self.config.shuffle_playlist {
            let mut rng = StdRng::seed_from_u64(participant_seed(participant));
            main.shuffle(&mut rng);
        }

        self.config
            .demo_video
            .iter()
            .cloned()
            .map(|video| PlaylistItem { video, demo: true })
            .chain(main)
            .collect()
    }

    fn record_display(&mut self, display: &DisplayInfo) {
        self.log_main(format_args!(
            "monitor,{},{}",
            display.width_mm, display.height_mm
        ));
        self.log_main(format_args!(
            "resolution,{},{}",
            display.resolution.0, display.resolution.1
        ));
        self.log_main(format_args!(
            "inner_area,{},{}",
            display.inner_area.0, display.inner_area.1
        ));
        self.log_main(format_args!(
            "calibration_radius,{}",
            display.calibration_radius
        ));
    }

    fn transition(&mut self, action: SessionAction) -> Result<Phase> {
        let next = self
            .state
            .apply(action)
            .with_context(|| format!("session {}", self.session_id))?;
        self.log_main(format_args!("phase,{}", next.name()));
        Ok(next)
    }

    /// Best-effort transition used on the way out.
    fn advance(&mut self, action: SessionAction) {
        match self.state.apply(action) {
            Ok(next) => self.log_main(format_args!("phase,{}", next.name())),
            Err(err) => error!("{err}"),
        }
    }

    fn log_main(&mut self, record: fmt::Arguments<'_>) {
        if let Some(log) = self.main_log.as_mut() {
            if let Err(err) = log.record(record) {
                error!("Failed to write main log: {err:?}");
            }
        }
    }

    fn send_ui(&self, update: UiUpdate) {
        if self.ui.send(update).is_err() {
            debug!("Front end gone; dropping update");
        }
    }
}

/// Stable across runs and platforms, so a participant always sees the same order.
fn participant_seed(participant: &str) -> u64 {
    participant.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}
