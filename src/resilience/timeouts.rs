//! Deadline tracking.
//!
//! Uses `tokio::time::Instant` so paused-clock tests see the same time as the
//! timers they drive.

use std::time::Duration;
use tokio::time::Instant;

/// A start time plus a time budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start the clock now.
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.budget
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}
