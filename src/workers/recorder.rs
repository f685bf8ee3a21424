use anyhow::{Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::camera::{Camera, FrameWriter};
use crate::output::{LogWriter, SessionClock};

use super::handle::WorkerHandle;

const ENABLE_LOGS: bool = true;
// About one frame at 30 fps.
const DROPPED_FRAME_BACKOFF: Duration = Duration::from_millis(33);

use crate::{log_error, log_info};

pub struct RecorderParams {
    pub camera: Box<dyn Camera>,
    pub writer: Box<dyn FrameWriter>,
    pub timeline: LogWriter,
    pub clock: SessionClock,
}

/// Session-long webcam capture. Spans every video, unlike the per-video workers.
pub fn spawn_recorder(params: RecorderParams) -> WorkerHandle {
    WorkerHandle::spawn("recorder", move |token| async move {
        tokio::task::spawn_blocking(move || capture_loop(params, token))
            .await
            .context("recorder capture thread panicked")?
    })
}

fn capture_loop(params: RecorderParams, cancel_token: CancellationToken) -> Result<()> {
    let RecorderParams {
        mut camera,
        mut writer,
        mut timeline,
        clock,
    } = params;
    log_info!("webcam recorder running");

    let mut frames: u64 = 0;
    let mut result = Ok(());
    while !cancel_token.is_cancelled() {
        match camera.read_frame() {
            Ok(Some(frame)) => {
                let at = clock.now();
                if let Err(err) = writer.write(&frame).and_then(|_| timeline.stamp(at)) {
                    result = Err(err);
                    break;
                }
                frames += 1;
            }
            Ok(None) => std::thread::sleep(DROPPED_FRAME_BACKOFF),
            Err(err) => {
                log_error!("camera read failed: {err:?}");
                result = Err(err);
                break;
            }
        }
    }

    // Release everything even when the loop ended on an error.
    if let Err(err) = writer.release() {
        log_error!("failed to release recording: {err:?}");
    }
    camera.release();
    timeline.close()?;
    log_info!("webcam recorder stopped after {} frames", frames);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::tests::ScriptedCamera;
    use crate::camera::RawFrameWriter;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn releases_device_and_writes_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let clock = SessionClock::new();
        let released = Arc::new(AtomicU32::new(0));
        let timeline_path = dir.path().join("video_timeline.txt");

        let mut recorder = spawn_recorder(RecorderParams {
            camera: Box::new(ScriptedCamera {
                good: 25,
                released: Arc::clone(&released),
            }),
            writer: Box::new(RawFrameWriter::create(dir.path().join("recording.raw")).unwrap()),
            timeline: LogWriter::create(&timeline_path, clock).unwrap(),
            clock,
        });
        recorder.execute();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let outcome = recorder.finish(Duration::from_secs(5)).await;
        assert_eq!(outcome, crate::workers::FinishOutcome::Stopped);
        assert_eq!(released.load(Ordering::SeqCst), 1);

        let timeline = std::fs::read_to_string(&timeline_path).unwrap();
        assert_eq!(timeline.lines().count(), 25);
    }

    /// Never delivers a frame; counts how often it was asked.
    struct StalledCamera {
        reads: Arc<AtomicU32>,
    }

    impl Camera for StalledCamera {
        fn read_frame(&mut self) -> Result<Option<crate::camera::Frame>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        fn release(&mut self) {}
    }

    #[tokio::test]
    async fn dropped_frames_back_off_instead_of_spinning() {
        let dir = tempfile::tempdir().unwrap();
        let clock = SessionClock::new();
        let reads = Arc::new(AtomicU32::new(0));

        let mut recorder = spawn_recorder(RecorderParams {
            camera: Box::new(StalledCamera {
                reads: Arc::clone(&reads),
            }),
            writer: Box::new(RawFrameWriter::create(dir.path().join("recording.raw")).unwrap()),
            timeline: LogWriter::create(dir.path().join("video_timeline.txt"), clock).unwrap(),
            clock,
        });
        recorder.execute();
        tokio::time::sleep(Duration::from_millis(300)).await;
        recorder.finish(Duration::from_secs(5)).await;

        let reads = reads.load(Ordering::SeqCst);
        assert!(reads >= 1);
        assert!(reads < 50, "{reads} reads in 300ms");
    }

}
