pub mod audio;
pub mod camera;
pub mod config;
pub mod frontend;
pub mod input;
pub mod media;
pub mod output;
pub mod session;
pub mod workers;
mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use audio::RodioCuePlayer;
use camera::default_camera_backend;
use config::ConfigStore;
use frontend::{spawn_console_frontend, spawn_quit_on};
use input::InputHub;
use media::{resolver_from_settings, ProcessPlayer};
use output::SessionClock;
use session::{Phase, SessionController, SessionDeps, UiChannels};

pub use utils::logging::init as init_logging;

const DEFAULT_CONFIG: &str = "experiment.json";

/// Process entry point: `probecast [config.json]`.
pub fn run() -> Result<()> {
    init_logging();
    log::info!("Probecast starting up...");

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let store = ConfigStore::new(config_path)?;
    log::info!("Using config {}", store.path().display());
    let config = store.snapshot();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("probecast-worker")
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        let clock = SessionClock::new();
        let input = InputHub::new(clock);
        let console = spawn_console_frontend(input.clone());
        spawn_quit_on(shutdown_signal(), console.quit.clone());

        let player_program = config
            .player
            .command
            .clone()
            .unwrap_or_else(|| "mpv".to_string());
        let cue = Arc::new(RodioCuePlayer::new(config.probe.cue_sound.clone()));

        let deps = SessionDeps {
            player: Arc::new(ProcessPlayer::new(player_program, config.player.args.clone())),
            resolver: Arc::from(resolver_from_settings(&config.resolver)),
            cue: cue.clone(),
            cameras: default_camera_backend(),
            input,
        };
        let ui = UiChannels {
            events: console.events,
            updates: console.updates,
        };

        let controller = SessionController::new(config, deps, ui)?;
        let report = controller.run().await;
        cue.shutdown();

        // The printer exits after the final update.
        let _ = console.printer.await;

        log::info!(
            "Session {} finished in {:?}: {} played, {} failed, archive {:?}",
            report.session_id,
            report.phase,
            report.played.len(),
            report.failed.len(),
            report.archive
        );

        if report.phase == Phase::Error {
            anyhow::bail!("session {} ended in error", report.session_id);
        }
        Ok(())
    })
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                log::error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received Ctrl+C"),
        _ = terminate => log::info!("Received terminate signal"),
    }
}
