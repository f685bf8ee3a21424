use serde::Serialize;
use thiserror::Error;

use crate::config::VideoEntry;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Setup,
    CameraCheck,
    Calibration,
    DemoVideo,
    MainVideo,
    Finish,
    Error,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Finish | Phase::Error)
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::CameraCheck => "camera_check",
            Phase::Calibration => "calibration",
            Phase::DemoVideo => "demo_video",
            Phase::MainVideo => "main_video",
            Phase::Finish => "finish",
            Phase::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionAction {
    SubmitParticipant,
    ConfirmCamera,
    StartDemo,
    StartMain,
    Complete,
    /// Participant quit or the front end went away.
    Abort,
    Fail,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("action {action:?} is not allowed in phase {from:?}")]
    NotAllowed { from: Phase, action: SessionAction },
}

/// The transition table: `None` means the action is not allowed from `from`.
pub fn transition(from: Phase, action: SessionAction) -> Option<Phase> {
    use Phase::*;
    use SessionAction::*;

    match (from, action) {
        (Setup, SubmitParticipant) => Some(CameraCheck),
        (CameraCheck, ConfirmCamera) => Some(Calibration),
        (Calibration | DemoVideo, StartDemo) => Some(DemoVideo),
        (Calibration | DemoVideo | MainVideo, StartMain) => Some(MainVideo),
        (Calibration | DemoVideo | MainVideo, Complete) => Some(Finish),
        (phase, Abort) if !phase.is_terminal() => Some(Finish),
        (phase, Fail) if !phase.is_terminal() => Some(Phase::Error),
        _ => None,
    }
}

/// A queued video and whether it runs in demo mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistItem {
    pub video: VideoEntry,
    pub demo: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub participant: Option<String>,
    pub playlist: Vec<PlaylistItem>,
    pub phase: Phase,
    /// Index of the next video to start.
    pub video_index: usize,
}

impl SessionState {
    pub fn new(playlist: Vec<PlaylistItem>) -> Self {
        Self {
            playlist,
            ..Self::default()
        }
    }

    /// Applies `action` if the table allows it from the current phase.
    pub fn apply(&mut self, action: SessionAction) -> Result<Phase, TransitionError> {
        let next = transition(self.phase, action).ok_or(TransitionError::NotAllowed {
            from: self.phase,
            action,
        })?;
        self.phase = next;
        Ok(next)
    }

    pub fn next_video(&self) -> Option<&PlaylistItem> {
        self.playlist.get(self.video_index)
    }
}
