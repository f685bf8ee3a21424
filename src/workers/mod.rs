pub mod activity;
pub mod handle;
pub mod probe;
pub mod progress;
pub mod recorder;

pub use activity::{spawn_activity_logger, ActivityLoggerParams};
pub use handle::{FinishOutcome, WorkerHandle, WorkerStatus};
pub use probe::{spawn_probe_scheduler, ProbeSchedulerParams, ResponseWindow};
pub use progress::{spawn_progress_poller, ProgressPollerParams};
pub use recorder::{spawn_recorder, RecorderParams};
