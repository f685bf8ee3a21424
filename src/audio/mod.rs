pub mod chime;

use chime::Chime;

use rodio::{Decoder, OutputStream, Sink};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// Attention probe.
    Probe,
    /// Response key acknowledged.
    Confirm,
}

/// Fire-and-forget sound output.
pub trait CuePlayer: Send + Sync {
    fn play(&self, cue: Cue);
}

/// Silent player for headless runs.
pub struct MuteCuePlayer;

impl CuePlayer for MuteCuePlayer {
    fn play(&self, _cue: Cue) {}
}

enum AudioCommand {
    Play(Cue),
    Shutdown,
}

/// Plays cues on a dedicated audio thread holding the non-Send rodio objects.
pub struct RodioCuePlayer {
    tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
    probe_sound: Option<PathBuf>,
}

impl RodioCuePlayer {
    pub fn new(probe_sound: Option<PathBuf>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
            probe_sound,
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>, String> {
        let mut guard = self.tx.lock().map_err(|e| e.to_string())?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();
        let probe_sound = self.probe_sound.clone();

        thread::Builder::new()
            .name("audio-cues".to_string())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        log::error!("Failed to create audio output stream: {}", e);
                        return;
                    }
                };
                // Overlapping cues would blur together; reuse one sink so they queue.
                let sink = match Sink::try_new(&handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        log::error!("Failed to create audio sink: {}", e);
                        return;
                    }
                };

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Play(Cue::Probe) => match &probe_sound {
                            Some(path) => match open_sound(path) {
                                Ok(decoder) => sink.append(decoder),
                                Err(e) => {
                                    log::warn!("{e}; falling back to chime");
                                    sink.append(Chime::cue());
                                }
                            },
                            None => sink.append(Chime::cue()),
                        },
                        AudioCommand::Play(Cue::Confirm) => sink.append(Chime::confirm()),
                        AudioCommand::Shutdown => break,
                    }
                }
                sink.stop();
            })
            .map_err(|e| e.to_string())?;

        let tx_clone = tx.clone();
        *guard = Some(tx);
        Ok(tx_clone)
    }

    pub fn shutdown(&self) {
        if let Ok(Some(tx)) = self.tx.lock().map(|mut g| g.take()) {
            let _ = tx.send(AudioCommand::Shutdown);
        }
    }
}

impl CuePlayer for RodioCuePlayer {
    fn play(&self, cue: Cue) {
        let result = self
            .ensure_thread()
            .and_then(|tx| tx.send(AudioCommand::Play(cue)).map_err(|e| e.to_string()));
        if let Err(e) = result {
            log::warn!("Failed to play {:?} cue: {}", cue, e);
        }
    }
}

impl Drop for RodioCuePlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn open_sound(path: &Path) -> Result<Decoder<BufReader<File>>, String> {
    let file = File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    Decoder::new(BufReader::new(file))
        .map_err(|e| format!("cannot decode {}: {}", path.display(), e))
}
