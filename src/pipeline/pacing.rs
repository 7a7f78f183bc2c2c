//! Fixed-period pacing
//!
//! Both the ingestion loop and the broadcaster run at a target rate by
//! sleeping whatever is left of the period after doing their work. An
//! overrun is never paid back: the next cycle simply starts immediately.

use std::time::{Duration, Instant};

/// Period for `fps` cycles per second. Zero is treated as one.
pub fn frame_period(fps: u32) -> Duration {
    Duration::from_secs(1) / fps.max(1)
}

/// Time left of `period` after `elapsed` of work, `None` on overrun
pub fn remaining(period: Duration, elapsed: Duration) -> Option<Duration> {
    period.checked_sub(elapsed).filter(|d| !d.is_zero())
}

/// Tracks the start of the current cycle
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    period: Duration,
    cycle_start: Instant,
}

impl Pacer {
    /// Create a pacer for `period`
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            cycle_start: Instant::now(),
        }
    }

    /// Mark the start of a cycle
    pub fn start_cycle(&mut self) {
        self.cycle_start = Instant::now();
    }

    /// Time since the current cycle started
    pub fn elapsed(&self) -> Duration {
        self.cycle_start.elapsed()
    }

    /// Sleep owed after a cycle that took `elapsed`, `None` on overrun
    pub fn sleep_after(&self, elapsed: Duration) -> Option<Duration> {
        remaining(self.period, elapsed)
    }

    /// Sleep owed for the current cycle, `None` on overrun
    pub fn sleep_time(&self) -> Option<Duration> {
        self.sleep_after(self.elapsed())
    }

    /// Configured period
    pub fn period(&self) -> Duration {
        self.period
    }
}
