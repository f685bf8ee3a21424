use serde::Serialize;
use std::future::Future;
use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::input::{InputHub, InputKind};

/// Physical display facts gathered during calibration.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayInfo {
    pub width_mm: u32,
    pub height_mm: u32,
    pub resolution: (u32, u32),
    pub inner_area: (u32, u32),
    pub calibration_radius: u32,
}

/// What the participant did in the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    ParticipantSubmitted(String),
    Calibrated(DisplayInfo),
    /// "Start video" / "Next" button.
    StartVideo,
    FocusChanged(bool),
    Quit,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Screen {
    Welcome,
    Calibration,
    Player,
    Finished,
}

/// What the controller wants the UI to show.
#[derive(Debug, Clone, PartialEq)]
pub enum UiUpdate {
    ShowScreen(Screen),
    CameraUnavailable,
    NowPlaying { title: String, index: usize, total: usize },
    PlaybackFailed { title: String },
    PlaybackTime { time_ms: u64, length_ms: Option<u64> },
    NextEnabled(bool),
    ProbeReminder,
    Finished { archive: Option<PathBuf> },
}

/// Line-oriented terminal front end.
///
/// The first line is the participant id, an empty line presses "next", `q`
/// quits, and any other line is published as a key press (so `1`/`2`/`3`
/// answer probes). End of input quits.
pub struct ConsoleFrontend {
    pub events: mpsc::Receiver<UiEvent>,
    pub updates: mpsc::UnboundedSender<UiUpdate>,
    pub printer: JoinHandle<()>,
    /// Does not keep the event channel open.
    pub quit: mpsc::WeakSender<UiEvent>,
}

pub fn spawn_console_frontend(hub: InputHub) -> ConsoleFrontend {
    let (event_tx, event_rx) = mpsc::channel::<UiEvent>(32);
    let (update_tx, mut update_rx) = mpsc::unbounded_channel::<UiUpdate>();
    let quit = event_tx.downgrade();
    let calibration_tx = event_tx.downgrade();

    if let Err(err) = spawn_line_reader(std::io::BufReader::new(std::io::stdin()), hub, event_tx) {
        log::error!("Failed to start console input thread: {err}");
    }

    let printer = tokio::spawn(async move {
        while let Some(update) = update_rx.recv().await {
            match update {
                UiUpdate::ShowScreen(Screen::Welcome) => {
                    println!("Thank you for participating.");
                    println!("During each lecture you will hear a chime periodically.");
                    println!("When you hear it, press 1 (focused), 2 (not focused) or 3 (skip).");
                    println!("Type your participant id and press Enter:");
                }
                UiUpdate::ShowScreen(Screen::Calibration) => {
                    // No display geometry in a terminal.
                    if let Some(tx) = calibration_tx.upgrade() {
                        let _ = tx.send(UiEvent::Calibrated(DisplayInfo::default())).await;
                    }
                }
                UiUpdate::ShowScreen(Screen::Player) => {
                    println!("Press Enter to start the video.");
                }
                UiUpdate::ShowScreen(Screen::Finished) => {}
                UiUpdate::CameraUnavailable => {
                    println!("No camera available; continuing without recording.");
                }
                UiUpdate::NowPlaying { title, index, total } => {
                    println!("Playing {} ({}/{})", title, index + 1, total);
                }
                UiUpdate::PlaybackFailed { title } => {
                    println!("Could not play {title}; skipping.");
                }
                UiUpdate::PlaybackTime { .. } => {}
                UiUpdate::NextEnabled(true) => {
                    println!("Video finished. Press Enter to continue.");
                }
                UiUpdate::NextEnabled(false) => {}
                UiUpdate::ProbeReminder => {
                    println!("Please answer the chime with 1, 2 or 3.");
                }
                UiUpdate::Finished { archive } => {
                    match archive {
                        Some(path) => println!("All done. Results saved to {}", path.display()),
                        None => println!("All done."),
                    }
                    break;
                }
            }
        }
    });

    ConsoleFrontend {
        events: event_rx,
        updates: update_tx,
        printer,
        quit,
    }
}

/// Reads participant input line by line on its own thread. Sends `Quit` and
/// drops its sender when the input ends.
pub fn spawn_line_reader<R>(
    input: R,
    hub: InputHub,
    events: mpsc::Sender<UiEvent>,
) -> std::io::Result<thread::JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            let mut have_participant = false;
            for line in input.lines() {
                let Ok(line) = line else { break };
                let line = line.trim().to_string();

                let event = if !have_participant {
                    if line.is_empty() {
                        continue;
                    }
                    have_participant = true;
                    UiEvent::ParticipantSubmitted(line)
                } else if line.is_empty() {
                    UiEvent::StartVideo
                } else if line.eq_ignore_ascii_case("q") {
                    UiEvent::Quit
                } else {
                    hub.publish(InputKind::KeyPress(line.clone()));
                    hub.publish(InputKind::KeyRelease(line));
                    continue;
                };

                if events.blocking_send(event).is_err() {
                    return;
                }
            }
            let _ = events.blocking_send(UiEvent::Quit);
        })
}

/// Sends `Quit` into the session once `signal` resolves.
pub fn spawn_quit_on<F>(signal: F, events: mpsc::WeakSender<UiEvent>) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        signal.await;
        log::info!("Shutdown requested; ending session");
        if let Some(tx) = events.upgrade() {
            let _ = tx.send(UiEvent::Quit).await;
        }
    })
}
