mod helpers;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use helpers::*;
use probecast_lib::audio::{Cue, MuteCuePlayer};
use probecast_lib::camera::{Camera, Frame, RawFrameWriter};
use probecast_lib::config::{ProbeSettings, ResponseKeys};
use probecast_lib::input::{InputHub, InputKind};
use probecast_lib::media::{MediaPlayer, PlayableSource};
use probecast_lib::output::{LogWriter, SessionClock};
use probecast_lib::workers::{
    spawn_activity_logger, spawn_probe_scheduler, spawn_progress_poller, spawn_recorder,
    ActivityLoggerParams, FinishOutcome, ProbeSchedulerParams, ProgressPollerParams,
    RecorderParams, WorkerHandle, WorkerStatus,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

const STOP: Duration = Duration::from_secs(2);

fn activity_logger(
    hub: &InputHub,
    dir: &TempDir,
    video: &str,
    probe_tx: mpsc::UnboundedSender<probecast_lib::input::ProbeEvent>,
) -> WorkerHandle {
    spawn_activity_logger(
        hub,
        ActivityLoggerParams {
            video: video.to_string(),
            log: LogWriter::create(dir.path().join(format!("activity_{video}.txt")), hub.clock())
                .unwrap(),
            keys: ResponseKeys::default(),
            probe_tx,
            cue: None,
        },
    )
}

#[tokio::test(start_paused = true)]
async fn response_inside_window_is_recorded_and_late_press_is_dropped() {
    let dir = TempDir::new().unwrap();
    let clock = SessionClock::new();
    let hub = InputHub::new(clock);
    let player = FakePlayer::new();
    let (cue, mut cues) = RecordingCue::new();
    let (probe_tx, probe_rx) = mpsc::unbounded_channel();
    let probe_path = dir.path().join("probe_lecture.txt");

    let mut activity = activity_logger(&hub, &dir, "lecture", probe_tx);
    let mut probe = spawn_probe_scheduler(ProbeSchedulerParams {
        video: "lecture".into(),
        log: LogWriter::create(&probe_path, clock).unwrap(),
        settings: ProbeSettings {
            first_cue_ms: 1_000,
            interval_ms: 40_000,
            window_ms: 10_000,
            poll_interval_ms: 100,
            cue_sound: None,
            confirm_sound: false,
        },
        clock,
        player: player.clone(),
        cue,
        probe_rx,
        reminders: None,
    });

    player
        .play(&PlayableSource {
            title: "lecture".into(),
            location: "len:60000".into(),
        })
        .unwrap();
    activity.execute();
    probe.execute();

    assert_eq!(cues.recv().await, Some(Cue::Probe));

    tokio::time::sleep(Duration::from_secs(3)).await;
    hub.publish(InputKind::KeyPress("1".into()));
    tokio::time::sleep(Duration::from_secs(9)).await;
    hub.publish(InputKind::KeyPress("2".into()));
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(activity.finish(STOP).await, FinishOutcome::Stopped);
    assert_eq!(probe.finish(STOP).await, FinishOutcome::Stopped);

    let records = read_records(&probe_path);
    let cue_records: Vec<_> = records.iter().filter(|r| r.starts_with("cue,")).collect();
    let probe_records: Vec<_> = records.iter().filter(|r| r.starts_with("probe,")).collect();
    assert_eq!(cue_records.len(), 1);
    assert_eq!(probe_records.len(), 1, "{records:?}");
    assert!(probe_records[0].contains(",focused,"));
    assert!(!records.iter().any(|r| r.contains("unfocused")));

    // Both presses still reach the activity log.
    let activity_records = read_records(&dir.path().join("activity_lecture.txt"));
    assert!(activity_records.contains(&"key,press,1".to_string()));
    assert!(activity_records.contains(&"key,press,2".to_string()));
}

#[tokio::test(start_paused = true)]
async fn unanswered_window_records_none_and_reminds() {
    let dir = TempDir::new().unwrap();
    let clock = SessionClock::new();
    let player = FakePlayer::new();
    let (_probe_tx, probe_rx) = mpsc::unbounded_channel();
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    let probe_path = dir.path().join("probe_demo.txt");

    let mut probe = spawn_probe_scheduler(ProbeSchedulerParams {
        video: "demo".into(),
        log: LogWriter::create(&probe_path, clock).unwrap(),
        settings: ProbeSettings {
            first_cue_ms: 500,
            interval_ms: 40_000,
            window_ms: 2_000,
            poll_interval_ms: 100,
            cue_sound: None,
            confirm_sound: false,
        },
        clock,
        player: player.clone(),
        cue: Arc::new(MuteCuePlayer),
        probe_rx,
        reminders: Some(ui_tx),
    });
    player
        .play(&PlayableSource {
            title: "demo".into(),
            location: "len:10000".into(),
        })
        .unwrap();
    probe.execute();

    let reminder = ui_rx.recv().await;
    assert!(matches!(
        reminder,
        Some(probecast_lib::frontend::UiUpdate::ProbeReminder)
    ));
    assert_eq!(probe.finish(STOP).await, FinishOutcome::Stopped);

    let records = read_records(&probe_path);
    assert!(records.iter().any(|r| r.starts_with("probe,") && r.ends_with(",none")));
}

#[tokio::test(start_paused = true)]
async fn consecutive_activity_logs_do_not_interleave() {
    let dir = TempDir::new().unwrap();
    let hub = InputHub::new(SessionClock::new());
    let (probe_tx, _probe_rx) = mpsc::unbounded_channel();

    let mut first = activity_logger(&hub, &dir, "first", probe_tx.clone());
    first.execute();
    for x in 0..3 {
        hub.publish(InputKind::MouseMove { x, y: 0 });
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(first.finish(STOP).await, FinishOutcome::Stopped);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut second = activity_logger(&hub, &dir, "second", probe_tx);
    second.execute();
    for x in 10..13 {
        hub.publish(InputKind::MouseMove { x, y: 0 });
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(second.finish(STOP).await, FinishOutcome::Stopped);

    let first_stamps = read_timestamps(&dir.path().join("activity_first.txt"));
    let second_stamps = read_timestamps(&dir.path().join("activity_second.txt"));
    assert_eq!(first_stamps.len(), 3);
    assert_eq!(second_stamps.len(), 3);

    let first_last = first_stamps.iter().cloned().fold(f64::MIN, f64::max);
    let second_first = second_stamps.iter().cloned().fold(f64::MAX, f64::min);
    assert!(first_last < second_first);

    let second_records = read_records(&dir.path().join("activity_second.txt"));
    assert!(second_records.iter().all(|r| !r.starts_with("mouse,move,0,")));
}

struct IdleCamera;

impl Camera for IdleCamera {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        Ok(None)
    }

    fn release(&mut self) {}
}

#[tokio::test]
async fn every_worker_finishes_cleanly_without_execute() {
    let dir = TempDir::new().unwrap();
    let clock = SessionClock::new();
    let hub = InputHub::new(clock);
    let player = FakePlayer::new();
    let (ui_tx, _ui_rx) = mpsc::unbounded_channel();
    let (probe_tx, probe_rx) = mpsc::unbounded_channel();

    let activity = activity_logger(&hub, &dir, "unused", probe_tx);
    let probe = spawn_probe_scheduler(ProbeSchedulerParams {
        video: "unused".into(),
        log: LogWriter::create(dir.path().join("probe_unused.txt"), clock).unwrap(),
        settings: ProbeSettings::default(),
        clock,
        player: player.clone(),
        cue: Arc::new(MuteCuePlayer),
        probe_rx,
        reminders: None,
    });
    let (progress, _done) = spawn_progress_poller(ProgressPollerParams {
        video: "unused".into(),
        player,
        poll_interval: Duration::from_millis(10),
        ui: ui_tx,
    });
    let recorder = spawn_recorder(RecorderParams {
        camera: Box::new(IdleCamera),
        writer: Box::new(RawFrameWriter::create(dir.path().join("recording.raw")).unwrap()),
        timeline: LogWriter::create(dir.path().join("video_timeline.txt"), clock).unwrap(),
        clock,
    });

    for mut worker in [activity, probe, progress, recorder] {
        let outcome = tokio::time::timeout(Duration::from_secs(5), worker.finish(STOP))
            .await
            .expect("finish blocked");
        assert_eq!(outcome, FinishOutcome::Stopped, "{}", worker.name());
        assert_eq!(worker.status(), WorkerStatus::Stopped);
        assert_eq!(worker.finish(STOP).await, FinishOutcome::AlreadyFinished);
    }
}

#[tokio::test]
async fn recorder_stops_on_request_after_running() {
    let dir = TempDir::new().unwrap();
    let clock = SessionClock::new();
    let mut recorder = spawn_recorder(RecorderParams {
        camera: Box::new(IdleCamera),
        writer: Box::new(RawFrameWriter::create(dir.path().join("recording.raw")).unwrap()),
        timeline: LogWriter::create(dir.path().join("video_timeline.txt"), clock).unwrap(),
        clock,
    });
    recorder.execute();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(recorder.finish(STOP).await, FinishOutcome::Stopped);
    assert!(dir.path().join("video_timeline.txt").exists());
}
