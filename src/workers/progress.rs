use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::frontend::UiUpdate;
use crate::media::MediaPlayer;

use super::handle::WorkerHandle;

pub struct ProgressPollerParams {
    pub video: String,
    pub player: Arc<dyn MediaPlayer>,
    pub poll_interval: Duration,
    pub ui: mpsc::UnboundedSender<UiUpdate>,
}

/// Spawns the poller and returns a receiver that flips to `true` when
/// playback reaches a terminal state (or the player handle goes away).
pub fn spawn_progress_poller(params: ProgressPollerParams) -> (WorkerHandle, watch::Receiver<bool>) {
    let (done_tx, done_rx) = watch::channel(false);
    let name = format!("progress[{}]", params.video);
    let worker = WorkerHandle::spawn(name, move |token| progress_loop(params, done_tx, token));
    (worker, done_rx)
}

async fn progress_loop(
    params: ProgressPollerParams,
    done_tx: watch::Sender<bool>,
    cancel_token: CancellationToken,
) -> Result<()> {
    let mut ticker = tokio::time::interval(params.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }

        let progress = match params.player.progress() {
            Ok(progress) => progress,
            Err(err) => {
                log::warn!("progress poller for {} lost the player: {err}", params.video);
                break;
            }
        };

        let _ = params.ui.send(UiUpdate::PlaybackTime {
            time_ms: progress.time_ms,
            length_ms: progress.length_ms,
        });

        if progress.state.is_terminal() {
            log::info!("{} reached {:?}", params.video, progress.state);
            break;
        }
    }

    done_tx.send_replace(true);
    let _ = params.ui.send(UiUpdate::NextEnabled(true));
    Ok(())
}
