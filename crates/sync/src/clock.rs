// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Wall clock driven by the tokio runtime.

use kn_core::{ClockSource, SystemClock};
use tokio::time::Instant;

/// A clock anchored to the system time at creation and advanced by tokio's
/// monotonic clock.
///
/// Under a paused test runtime, `tokio::time::advance` moves this clock,
/// keeping store timestamps consistent with timer-driven behaviour.
#[derive(Debug)]
pub struct RuntimeClock {
    origin_ms: i64,
    origin: Instant,
}

impl RuntimeClock {
    /// Anchors the clock at the current system time.
    pub fn new() -> Self {
        Self::starting_at(SystemClock.now_ms())
    }

    /// Anchors the clock at `origin_ms` epoch milliseconds.
    pub fn starting_at(origin_ms: i64) -> Self {
        RuntimeClock {
            origin_ms,
            origin: Instant::now(),
        }
    }
}

impl Default for RuntimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for RuntimeClock {
    fn now_ms(&self) -> i64 {
        let elapsed = self.origin.elapsed().as_millis();
        self.origin_ms
            .saturating_add(i64::try_from(elapsed).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
