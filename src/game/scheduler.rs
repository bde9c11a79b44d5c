//! Wall-clock to tick conversion

use std::time::{Duration, Instant};

use crate::game::constants::scheduler::CATCH_UP_WARN_TICKS;

/// Turns elapsed wall-clock time into a whole number of simulation ticks
///
/// Time that does not fill a whole tick carries over to the next call, so a
/// late driver never loses simulation time.
#[derive(Debug, Clone)]
pub struct TickScheduler {
    interval: Duration,
    last: Option<Instant>,
    accumulated: Duration,
    total_ticks: u64,
}

impl TickScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_micros(1)),
            last: None,
            accumulated: Duration::ZERO,
            total_ticks: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ticks handed out since creation
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Time carried over towards the next tick
    pub fn carried(&self) -> Duration {
        self.accumulated
    }

    /// Number of ticks owed at `now`
    ///
    /// The first call only anchors the clock. A `now` earlier than the
    /// previous call counts as no elapsed time.
    pub fn ticks_due(&mut self, now: Instant) -> u32 {
        let Some(last) = self.last.replace(now) else {
            return 0;
        };
        self.accumulated += now.saturating_duration_since(last);

        let mut due: u32 = 0;
        while self.accumulated >= self.interval {
            self.accumulated -= self.interval;
            due = due.saturating_add(1);
        }
        self.total_ticks += due as u64;

        if due > CATCH_UP_WARN_TICKS {
            tracing::warn!(
                "Driver fell behind: catching up {} ticks ({:?} late)",
                due,
                self.interval * (due - 1)
            );
        }
        due
    }
}
