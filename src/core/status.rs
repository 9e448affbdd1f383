//! Refresh outcome accounting and staleness.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Data is considered stale once this many refresh intervals pass without a
/// successful refresh.
pub const STALENESS_FACTOR: u32 = 2;

/// Point-in-time view of a refresh loop's outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshStatus {
    /// Wall-clock time of the most recent successful refresh.
    pub last_refresh_time: Option<DateTime<Utc>>,
    /// Message of the most recent failed refresh, cleared by the next success.
    pub last_error: Option<String>,
    /// Number of successful refreshes.
    pub refresh_count: u64,
    /// Number of failed refreshes.
    pub error_count: u64,
    /// Whether more than two refresh intervals have passed since the last success.
    pub is_stale: bool,
}

/// Whether `elapsed` since the last success exceeds the staleness window.
pub fn staleness_exceeded(elapsed: Duration, interval: Duration) -> bool {
    elapsed > interval.saturating_mul(STALENESS_FACTOR)
}

#[derive(Debug, Default)]
struct TrackerState {
    last_success: Option<Instant>,
    last_success_time: Option<DateTime<Utc>>,
    last_error: Option<String>,
    refresh_count: u64,
    error_count: u64,
    last_outcome_ok: bool,
}

/// Shared record of refresh outcomes for one repository.
///
/// The refresh task is the only writer; accessors and HTTP handlers read
/// copies under the shared lock.
#[derive(Debug)]
pub(crate) struct StatusTracker {
    interval: Duration,
    state: RwLock<TrackerState>,
}

impl StatusTracker {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: RwLock::new(TrackerState::default()),
        }
    }

    pub(crate) fn record_success(&self) {
        let now = Instant::now();
        let wall = Utc::now();
        let mut state = self.state.write();
        state.last_success = Some(now);
        state.last_success_time = Some(wall);
        state.last_error = None;
        state.refresh_count += 1;
        state.last_outcome_ok = true;
    }

    pub(crate) fn record_failure(&self, error: &dyn std::fmt::Display) {
        let message = error.to_string();
        let mut state = self.state.write();
        state.last_error = Some(message);
        state.error_count += 1;
        state.last_outcome_ok = false;
    }

    pub(crate) fn snapshot(&self) -> RefreshStatus {
        let state = self.state.read();
        RefreshStatus {
            last_refresh_time: state.last_success_time,
            last_error: state.last_error.clone(),
            refresh_count: state.refresh_count,
            error_count: state.error_count,
            is_stale: self.stale_since(state.last_success),
        }
    }

    pub(crate) fn is_stale(&self) -> bool {
        self.stale_since(self.state.read().last_success)
    }

    /// Whether the most recent refresh succeeded.
    #[cfg_attr(not(feature = "server"), allow(dead_code))]
    pub(crate) fn last_outcome_ok(&self) -> bool {
        self.state.read().last_outcome_ok
    }

    #[cfg_attr(not(feature = "server"), allow(dead_code))]
    pub(crate) fn has_succeeded(&self) -> bool {
        self.state.read().refresh_count > 0
    }

    fn stale_since(&self, last_success: Option<Instant>) -> bool {
        match last_success {
            Some(at) => staleness_exceeded(at.elapsed(), self.interval),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_never_refreshed_is_stale() {
        let tracker = StatusTracker::new(Duration::from_secs(5));
        let status = tracker.snapshot();
        assert!(status.is_stale);
        assert_eq!(status.refresh_count, 0);
        assert!(status.last_refresh_time.is_none());
        assert!(!tracker.last_outcome_ok());
        assert!(!tracker.has_succeeded());
    }

    #[test]
    fn test_success_clears_error() {
        let tracker = StatusTracker::new(Duration::from_secs(5));
        tracker.record_failure(&"boom");
        assert_eq!(tracker.snapshot().last_error.as_deref(), Some("boom"));

        tracker.record_success();
        let status = tracker.snapshot();
        assert!(status.last_error.is_none());
        assert_eq!(status.refresh_count, 1);
        assert_eq!(status.error_count, 1);
        assert!(tracker.last_outcome_ok());
    }

    #[test]
    fn test_failure_keeps_last_success_time() {
        let tracker = StatusTracker::new(Duration::from_secs(5));
        tracker.record_success();
        let succeeded_at = tracker.snapshot().last_refresh_time;

        tracker.record_failure(&"timeout");
        let status = tracker.snapshot();
        assert_eq!(status.last_refresh_time, succeeded_at);
        assert!(!status.is_stale);
        assert!(!tracker.last_outcome_ok());
        assert!(tracker.has_succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_becomes_stale_after_two_intervals() {
        let tracker = StatusTracker::new(Duration::from_secs(5));
        tracker.record_success();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!tracker.is_stale());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(tracker.is_stale());
    }

    proptest! {
        #[test]
        fn prop_staleness_is_twice_the_interval(interval_ms in 1u64..100_000, elapsed_ms in 0u64..500_000) {
            let interval = Duration::from_millis(interval_ms);
            let elapsed = Duration::from_millis(elapsed_ms);
            prop_assert_eq!(staleness_exceeded(elapsed, interval), elapsed_ms > 2 * interval_ms);
        }
    }
}
