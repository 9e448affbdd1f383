//! Background refresh scheduling.
//!
//! Every repository gets one task that ticks at the refresh interval, calls
//! [`Repository::refresh`] and records the outcome. Tasks stop when their
//! owner's cancellation token fires, including in the middle of a refresh.

use crate::core::status::StatusTracker;
use crate::error::Result;
use crate::sources::Repository;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Shortest refresh interval accepted by clients and servers.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Raise `requested` to [`MIN_REFRESH_INTERVAL`] if it is below the floor.
pub fn effective_interval(requested: Duration) -> Duration {
    if requested < MIN_REFRESH_INTERVAL {
        tracing::warn!(
            requested_ms = requested.as_millis() as u64,
            interval_secs = MIN_REFRESH_INTERVAL.as_secs(),
            "Refresh interval too low, using the minimum"
        );
        MIN_REFRESH_INTERVAL
    } else {
        requested
    }
}

/// Refresh `repository` once and record the outcome in `status`.
pub(crate) async fn refresh_once(repository: &dyn Repository, status: &StatusTracker) -> Result<()> {
    match repository.refresh().await {
        Ok(()) => {
            status.record_success();
            Ok(())
        }
        Err(err) => {
            tracing::error!(repository = %repository.name(), error = %err, "Error refreshing repository");
            status.record_failure(&err);
            Err(err)
        }
    }
}

/// Spawn the refresh loop for one repository onto `tasks`.
pub(crate) fn spawn_refresh_task(
    tasks: &TaskTracker,
    repository: Arc<dyn Repository>,
    status: Arc<StatusTracker>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tasks.spawn(run_refresh_loop(repository, status, interval, cancel));
}

async fn run_refresh_loop(
    repository: Arc<dyn Repository>,
    status: Arc<StatusTracker>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::debug!(
        repository = %repository.name(),
        interval_secs = interval.as_secs(),
        "Refresh task started"
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    // Failures are already logged and counted.
                    _ = refresh_once(repository.as_ref(), &status) => {}
                }
            }
        }
    }

    tracing::debug!(repository = %repository.name(), "Refresh task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::mock::MockRepository;

    #[test]
    fn test_effective_interval_floor() {
        assert_eq!(effective_interval(Duration::from_secs(1)), MIN_REFRESH_INTERVAL);
        assert_eq!(effective_interval(Duration::ZERO), MIN_REFRESH_INTERVAL);
        assert_eq!(effective_interval(Duration::from_secs(30)), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_refresh_once_records_outcomes() {
        let repository = MockRepository::new("mock");
        let status = StatusTracker::new(MIN_REFRESH_INTERVAL);

        refresh_once(&repository, &status).await.unwrap();
        repository.set_failing(true);
        assert!(refresh_once(&repository, &status).await.is_err());

        let snapshot = status.snapshot();
        assert_eq!(snapshot.refresh_count, 1);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.last_error.as_deref(), Some("Failed to load configuration: mock refresh error"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_ticks_until_cancelled() {
        let repository = Arc::new(MockRepository::new("mock"));
        let status = Arc::new(StatusTracker::new(MIN_REFRESH_INTERVAL));
        let tasks = TaskTracker::new();
        let cancel = CancellationToken::new();

        spawn_refresh_task(
            &tasks,
            repository.clone(),
            status.clone(),
            MIN_REFRESH_INTERVAL,
            cancel.clone(),
        );

        // No refresh before the first full interval.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(repository.refresh_count(), 0);

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(repository.refresh_count(), 3);
        assert_eq!(status.snapshot().refresh_count, 3);

        cancel.cancel();
        tasks.close();
        tasks.wait().await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(repository.refresh_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_slow_refresh() {
        let repository = Arc::new(MockRepository::new("slow").with_delay(Duration::from_secs(60)));
        let status = Arc::new(StatusTracker::new(MIN_REFRESH_INTERVAL));
        let tasks = TaskTracker::new();
        let cancel = CancellationToken::new();

        spawn_refresh_task(&tasks, repository.clone(), status.clone(), MIN_REFRESH_INTERVAL, cancel.clone());

        // The first tick starts a refresh that would take a minute.
        tokio::time::sleep(Duration::from_secs(6)).await;
        cancel.cancel();
        tasks.close();
        tasks.wait().await;

        assert_eq!(status.snapshot().refresh_count, 0);
        assert_eq!(status.snapshot().error_count, 0);
    }
}
