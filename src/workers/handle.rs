use anyhow::Result;
use log::{info, warn};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WorkerStatus {
    Idle,
    /// Spawned, waiting for the start signal.
    Armed,
    Running,
    /// Stop requested, finishing the current iteration.
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    /// The worker observed the stop signal and exited.
    Stopped,
    /// The worker ignored the stop signal for the whole timeout and was aborted.
    /// Its output may be truncated.
    TimedOut,
    /// `finish` had already been called.
    AlreadyFinished,
}

/// Start/stop gate around one background task.
///
/// The task is spawned immediately but only runs its body after `execute`.
/// `finish` cancels it cooperatively and aborts it if it does not exit in time.
pub struct WorkerHandle {
    name: String,
    start_tx: watch::Sender<bool>,
    cancel_token: CancellationToken,
    status: Arc<watch::Sender<WorkerStatus>>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let (start_tx, mut start_rx) = watch::channel(false);
        let cancel_token = CancellationToken::new();
        let (status_tx, _) = watch::channel(WorkerStatus::Idle);
        let status = Arc::new(status_tx);

        let task_token = cancel_token.clone();
        let task_status = Arc::clone(&status);
        let task_name = name.clone();

        task_status.send_replace(WorkerStatus::Armed);
        let handle = tokio::spawn(async move {
            let started = tokio::select! {
                biased;
                _ = task_token.cancelled() => false,
                res = start_rx.wait_for(|started| *started) => res.is_ok(),
            };

            if started {
                task_status.send_replace(WorkerStatus::Running);
                if let Err(err) = body(task_token).await {
                    log::error!("{} worker failed: {err:?}", task_name);
                }
            }

            task_status.send_replace(WorkerStatus::Stopped);
        });

        Self {
            name,
            start_tx,
            cancel_token,
            status,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> WorkerStatus {
        *self.status.borrow()
    }

    /// Subscribe to status changes.
    pub fn watch_status(&self) -> watch::Receiver<WorkerStatus> {
        self.status.subscribe()
    }

    /// Releases the start signal. Calling it again is a no-op.
    pub fn execute(&self) {
        self.start_tx.send_if_modified(|started| {
            if *started {
                false
            } else {
                *started = true;
                true
            }
        });
    }

    /// Requests a stop and waits up to `timeout` for the task to exit.
    pub async fn finish(&mut self, timeout: Duration) -> FinishOutcome {
        let Some(mut handle) = self.handle.take() else {
            return FinishOutcome::AlreadyFinished;
        };

        self.status.send_if_modified(|status| {
            if *status == WorkerStatus::Running {
                *status = WorkerStatus::Draining;
                true
            } else {
                false
            }
        });
        self.cancel_token.cancel();

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!("{} worker stopped", self.name);
                FinishOutcome::Stopped
            }
            Ok(Err(join_err)) => {
                warn!("{} worker task failed to join: {join_err}", self.name);
                self.status.send_replace(WorkerStatus::Stopped);
                FinishOutcome::Stopped
            }
            Err(_) => {
                warn!(
                    "{} worker did not stop within {:?}; aborting",
                    self.name, timeout
                );
                handle.abort();
                self.status.send_replace(WorkerStatus::Stopped);
                FinishOutcome::TimedOut
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
