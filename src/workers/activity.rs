use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::audio::{Cue, CuePlayer};
use crate::config::ResponseKeys;
use crate::input::{InputEvent, InputHub, InputKind, ProbeCode, ProbeEvent};
use crate::output::LogWriter;

use super::handle::WorkerHandle;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub struct ActivityLoggerParams {
    pub video: String,
    pub log: LogWriter,
    pub keys: ResponseKeys,
    pub probe_tx: mpsc::UnboundedSender<ProbeEvent>,
    pub cue: Option<Arc<dyn CuePlayer>>,
}

/// Writes every global input event for one video and forwards response keys.
///
/// Subscribes to the hub on creation, so events published between creation
/// and `execute` are still recorded once the worker starts.
pub fn spawn_activity_logger(hub: &InputHub, params: ActivityLoggerParams) -> WorkerHandle {
    let rx = hub.subscribe();
    let name = format!("activity[{}]", params.video);
    WorkerHandle::spawn(name, move |token| activity_loop(rx, params, token))
}

async fn activity_loop(
    mut rx: broadcast::Receiver<InputEvent>,
    params: ActivityLoggerParams,
    cancel_token: CancellationToken,
) -> Result<()> {
    let ActivityLoggerParams {
        video,
        mut log,
        keys,
        probe_tx,
        cue,
    } = params;
    log_info!("activity logger started for {}", video);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            received = rx.recv() => match received {
                Ok(event) => handle_event(&mut log, &keys, &probe_tx, cue.as_deref(), event)?,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log_warn!("activity logger for {} lagged, {} events lost", video, missed);
                    log.record(format_args!("input,lagged,{missed}"))?;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    // Drain what was already published before the stop request.
    loop {
        match rx.try_recv() {
            Ok(event) => handle_event(&mut log, &keys, &probe_tx, cue.as_deref(), event)?,
            Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                log.record(format_args!("input,lagged,{missed}"))?;
            }
            Err(_) => break,
        }
    }

    log.close()
        .with_context(|| format!("failed to close activity log for {video}"))?;
    log_info!("activity logger stopped for {}", video);
    Ok(())
}

fn handle_event(
    log: &mut LogWriter,
    keys: &ResponseKeys,
    probe_tx: &mpsc::UnboundedSender<ProbeEvent>,
    cue: Option<&dyn CuePlayer>,
    event: InputEvent,
) -> Result<()> {
    log.record_at(event.at, format_args!("{}", event.kind))?;

    if let InputKind::KeyPress(key) = &event.kind {
        if let Some(code) = ProbeCode::from_key(keys, key) {
            // Scheduler gone means playback ended; the press is still in the activity log.
            let _ = probe_tx.send(ProbeEvent { at: event.at, code });
            if let Some(cue) = cue {
                cue.play(Cue::Confirm);
            }
        }
    }
    Ok(())
}
