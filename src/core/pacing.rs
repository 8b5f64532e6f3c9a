use crate::core::model::SessionStatus;
use std::time::Duration;

pub const FAST_INTERVAL_MS: u64 = 250;
pub const IDLE_INTERVAL_MS: u64 = 500;
pub const MAX_INTERVAL_MS: u64 = 1000;
pub const BACKOFF_STEP_MS: u64 = 100;
/// Stale reads tolerated before the interval starts growing.
pub const STALE_READS_BEFORE_BACKOFF: u32 = 8;
pub const STALE_DELTA: f64 = 0.1;

/// Decides the wait between two progress polls from the observed progress delta.
#[derive(Debug, Clone)]
pub struct PollPacing {
    interval_ms: u64,
    consecutive_stale_reads: u32,
    last_progress: f64,
}

impl Default for PollPacing {
    fn default() -> Self {
        Self::new()
    }
}

impl PollPacing {
    pub fn new() -> Self {
        Self { interval_ms: FAST_INTERVAL_MS, consecutive_stale_reads: 0, last_progress: 0.0 }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn consecutive_stale_reads(&self) -> u32 {
        self.consecutive_stale_reads
    }

    /// Feeds one successful read and returns the wait before the next one.
    pub fn observe(&mut self, current_progress: f64, status: SessionStatus) -> Duration {
        if (current_progress - self.last_progress).abs() < STALE_DELTA {
            self.consecutive_stale_reads = self.consecutive_stale_reads.saturating_add(1);
            if self.consecutive_stale_reads > STALE_READS_BEFORE_BACKOFF {
                self.interval_ms = (self.interval_ms + BACKOFF_STEP_MS).min(MAX_INTERVAL_MS);
            }
        } else {
            self.consecutive_stale_reads = 0;
            self.interval_ms = if status == SessionStatus::Downloading {
                FAST_INTERVAL_MS
            } else {
                IDLE_INTERVAL_MS
            };
        }
        self.last_progress = current_progress;
        Duration::from_millis(self.interval_ms)
    }

    /// Wait after a failed read. Does not touch the pacing state.
    pub fn after_error(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(MAX_INTERVAL_MS))
    }
}
