use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// Wall-clock timestamps derived from the tokio clock.
///
/// Every record written during a session is stamped through one shared
/// `SessionClock`, so timestamps from different workers are comparable and
/// monotonic even if the system clock is adjusted mid-session.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    wall_anchor: DateTime<Utc>,
    anchor: Instant,
}

/// Seconds since the unix epoch, as written into every log record.
pub type Timestamp = f64;

impl SessionClock {
    pub fn new() -> Self {
        Self {
            wall_anchor: Utc::now(),
            anchor: Instant::now(),
        }
    }

    pub fn now(&self) -> Timestamp {
        let base = self.wall_anchor.timestamp_micros() as f64 / 1_000_000.0;
        base + self.anchor.elapsed().as_secs_f64()
    }

    /// Time elapsed between two stamps, clamped at zero.
    pub fn between(earlier: Timestamp, later: Timestamp) -> Duration {
        Duration::from_secs_f64((later - earlier).max(0.0))
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}
