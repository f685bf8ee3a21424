use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::audio::{Cue, CuePlayer};
use crate::config::ProbeSettings;
use crate::frontend::UiUpdate;
use crate::input::ProbeEvent;
use crate::media::MediaPlayer;
use crate::output::{LogWriter, SessionClock, Timestamp};

use super::handle::WorkerHandle;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Response window opened by one cue.
#[derive(Debug, Clone)]
pub struct ResponseWindow {
    pub opened_at: Timestamp,
    pub playback_ms: u64,
    length: Duration,
    best: Option<ProbeEvent>,
}

impl ResponseWindow {
    pub fn open(opened_at: Timestamp, playback_ms: u64, length: Duration) -> Self {
        Self {
            opened_at,
            playback_ms,
            length,
            best: None,
        }
    }

    /// Accepts an event iff `0 <= at - opened_at < length`; the latest accepted wins.
    pub fn offer(&mut self, event: ProbeEvent) -> bool {
        let offset = event.at - self.opened_at;
        if offset < 0.0 || offset >= self.length.as_secs_f64() {
            return false;
        }
        match self.best {
            Some(best) if best.at > event.at => {}
            _ => self.best = Some(event),
        }
        true
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now - self.opened_at >= self.length.as_secs_f64()
    }

    pub fn response(&self) -> Option<ProbeEvent> {
        self.best
    }
}

pub struct ProbeSchedulerParams {
    pub video: String,
    pub log: LogWriter,
    pub settings: ProbeSettings,
    pub clock: SessionClock,
    pub player: Arc<dyn MediaPlayer>,
    pub cue: Arc<dyn CuePlayer>,
    pub probe_rx: mpsc::UnboundedReceiver<ProbeEvent>,
    /// Demo mode: remind the participant when a cue goes unanswered.
    pub reminders: Option<mpsc::UnboundedSender<UiUpdate>>,
}

pub fn spawn_probe_scheduler(params: ProbeSchedulerParams) -> WorkerHandle {
    let name = format!("probe[{}]", params.video);
    WorkerHandle::spawn(name, move |token| probe_loop(params, token))
}

async fn probe_loop(params: ProbeSchedulerParams, cancel_token: CancellationToken) -> Result<()> {
    let ProbeSchedulerParams {
        video,
        mut log,
        settings,
        clock,
        player,
        cue,
        mut probe_rx,
        reminders,
    } = params;

    let mut ticker = tokio::time::interval(settings.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut next_cue_ms = settings.first_cue_ms;
    let mut window: Option<ResponseWindow> = None;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let progress = match player.progress() {
            Ok(progress) => progress,
            Err(err) => {
                log_warn!("probe scheduler for {} lost the player: {err}", video);
                break;
            }
        };

        match window.as_mut() {
            Some(open) => {
                while let Ok(event) = probe_rx.try_recv() {
                    open.offer(event);
                }
            }
            None => {
                // Presses outside any window are not responses.
                while probe_rx.try_recv().is_ok() {}
            }
        }

        if window.as_ref().is_some_and(|w| w.is_expired(clock.now())) {
            if let Some(closed) = window.take() {
                close_window(&mut log, &closed, reminders.as_ref())?;
            }
        }

        if progress.state.is_terminal() {
            break;
        }

        if window.is_none() && progress.time_ms >= next_cue_ms {
            cue.play(Cue::Probe);
            let opened_at = log.record(format_args!("cue,{}", progress.time_ms))?;
            window = Some(ResponseWindow::open(
                opened_at,
                progress.time_ms,
                settings.window(),
            ));
            next_cue_ms = progress.time_ms + settings.interval_ms.max(1);
        }
    }

    if let Some(mut open) = window.take() {
        while let Ok(event) = probe_rx.try_recv() {
            open.offer(event);
        }
        close_window(&mut log, &open, None)?;
    }

    log.close()?;
    log_info!("probe scheduler finished for {}", video);
    Ok(())
}

fn close_window(
    log: &mut LogWriter,
    window: &ResponseWindow,
    reminders: Option<&mpsc::UnboundedSender<UiUpdate>>,
) -> Result<()> {
    match window.response() {
        Some(event) => {
            let latency_ms = SessionClock::between(window.opened_at, event.at).as_millis();
            log.record_at(
                event.at,
                format_args!(
                    "probe,{},{},{}",
                    window.playback_ms,
                    event.code.name(),
                    latency_ms
                ),
            )?;
        }
        None => {
            log.record(format_args!("probe,{},none", window.playback_ms))?;
            if let Some(tx) = reminders {
                let _ = tx.send(UiUpdate::ProbeReminder);
            }
        }
    }
    Ok(())
}
