//! Fixed-period sweep scheduling.
//!
//! Behaves like an interval timer driven by the host loop: each call to
//! [`SweepTimer::poll`] reports at most one due tick, and intervals missed
//! during a stall are skipped rather than queued.

use std::time::{Duration, Instant};

/// Shortest interval the timer accepts.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Deadline tracker for the periodic ledger sweep.
#[derive(Debug, Clone)]
pub struct SweepTimer {
    interval: Duration,
    next_due: Instant,
}

impl SweepTimer {
    /// Starts a timer whose first tick falls one interval after `now`.
    pub fn start(interval: Duration, now: Instant) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        Self {
            interval,
            next_due: now + interval,
        }
    }

    /// Returns `true` if a tick is due at `now`, and schedules the next one.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }
        // Keep the phase of the original schedule: the next tick is the first
        // multiple of the interval strictly after `now`.
        let behind = now.duration_since(self.next_due);
        let into_period = behind.as_nanos() % self.interval.as_nanos();
        let into_period = Duration::from_nanos(u64::try_from(into_period).unwrap_or(u64::MAX));
        self.next_due = now + self.interval.saturating_sub(into_period);
        true
    }

    /// The sweep period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Instant of the next tick.
    pub fn next_due(&self) -> Instant {
        self.next_due
    }
}
