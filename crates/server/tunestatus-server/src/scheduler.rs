//! Fixed-interval trigger for the status sync job.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tunestatus_core::StatusSync;

/// Runs a [`StatusSync`] every `interval` until cancelled.
///
/// A run that outlasts the interval delays the next one instead of overlapping
/// it; the missed ticks are skipped. Each run executes in its own task so a
/// panicking job is logged and the schedule carries on.
pub struct SyncScheduler {
    job: Arc<dyn StatusSync>,
    interval: Duration,
}

impl SyncScheduler {
    pub fn new(job: Arc<dyn StatusSync>, interval: Duration) -> Self {
        Self { job, interval }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval = ?self.interval, "Status sync scheduler started");

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let job = Arc::clone(&self.job);
            let mut run = tokio::spawn(async move { job.sync_status().await });

            let outcome = tokio::select! {
                _ = shutdown.cancelled() => {
                    run.abort();
                    break;
                }
                outcome = &mut run => outcome,
            };

            match outcome {
                Ok(Ok(())) => debug!("Status sync completed"),
                Ok(Err(e)) => warn!(error = %e, "Status sync failed"),
                Err(e) if e.is_panic() => error!("Status sync panicked"),
                Err(e) => error!(error = %e, "Status sync task failed"),
            }
        }

        info!("Status sync scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tunestatus_core::{SyncError, SyncResult};

    #[derive(Default)]
    struct SlowSync {
        calls: AtomicUsize,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    #[async_trait]
    impl StatusSync for SlowSync {
        async fn sync_status(&self) -> SyncResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(25)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FlakySync {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StatusSync for FlakySync {
        async fn sync_status(&self) -> SyncResult<()> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => panic!("first sync blows up"),
                1 => Err(SyncError::Upstream("spotify unavailable".to_string())),
                _ => Ok(()),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_do_not_overlap() {
        let job = Arc::new(SlowSync::default());
        let shutdown = CancellationToken::new();
        let handle = SyncScheduler::new(job.clone(), Duration::from_secs(10)).spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_secs(100)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(job.max_running.load(Ordering::SeqCst), 1);
        // late ticks fire once on completion: runs start at 10, 35, 60, 85
        assert_eq!(job.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_and_panics_do_not_stop_schedule() {
        let job = Arc::new(FlakySync::default());
        let shutdown = CancellationToken::new();
        let handle = SyncScheduler::new(job.clone(), Duration::from_secs(10)).spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_secs(45)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(job.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_tick() {
        let job = Arc::new(FlakySync::default());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        SyncScheduler::new(job.clone(), Duration::from_secs(10))
            .run(shutdown)
            .await;

        assert_eq!(job.calls.load(Ordering::SeqCst), 0);
    }
}
