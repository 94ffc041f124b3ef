//! Periodic liveness reporting for a registered instance.
//!
//! The heartbeat runs as an owned tokio task: it is started with a
//! cancellation token, and `stop()` cancels it and waits for it to finish.
//! A failed report is logged and retried on the next tick; it never ends the
//! loop.

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::registry::Registry;
use crate::config::HeartbeatConfig;

/// Counters collected over the lifetime of a heartbeat task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatStats {
    /// Health reports the store accepted.
    pub reports: u64,
    /// Health reports that failed.
    pub failures: u64,
}

/// Handle to a running heartbeat loop.
#[derive(Debug)]
pub struct HeartbeatTask {
    cancel: CancellationToken,
    handle: JoinHandle<HeartbeatStats>,
}

impl HeartbeatTask {
    /// Starts reporting the instance as healthy every `config.interval`.
    ///
    /// The first report is sent immediately. The loop ends when `parent` (or
    /// the task's own token, via [`HeartbeatTask::stop`]) is cancelled.
    #[must_use]
    pub fn spawn(
        registry: Registry,
        instance_id: String,
        service_name: String,
        config: HeartbeatConfig,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut stats = HeartbeatStats::default();
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let report = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    report = registry.report_healthy_state(&instance_id, &service_name) => report,
                };

                match report {
                    Ok(()) => {
                        stats.reports += 1;
                        debug!(%instance_id, "reported healthy state");
                    }
                    Err(err) => {
                        stats.failures += 1;
                        metrics::counter!("cinemesh_heartbeat_failures_total").increment(1);
                        warn!(%instance_id, %service_name, error = %err, "failed to report healthy state");
                    }
                }
            }

            debug!(%instance_id, reports = stats.reports, failures = stats.failures, "heartbeat stopped");
            stats
        });

        Self { cancel, handle }
    }

    /// Returns `true` once the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels the loop and waits for it to exit.
    pub async fn stop(self) -> HeartbeatStats {
        self.cancel.cancel();
        self.join().await
    }

    /// Waits for the loop to exit without cancelling it.
    pub async fn join(self) -> HeartbeatStats {
        match self.handle.await {
            Ok(stats) => stats,
            Err(err) => {
                error!(error = %err, "heartbeat task terminated abnormally");
                HeartbeatStats::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::discovery::store::{DiscoveryStore, InMemoryDiscoveryStore};

    fn config(interval_ms: u64) -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_millis(interval_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_instance_live_past_ttl() {
        let store = Arc::new(InMemoryDiscoveryStore::new(Duration::from_secs(2)));
        let registry = Registry::new(store.clone());
        registry.register("rating-1", "rating", "a").await.unwrap();

        let root = CancellationToken::new();
        let task = HeartbeatTask::spawn(
            registry.clone(),
            "rating-1".to_string(),
            "rating".to_string(),
            config(1000),
            &root,
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.lookup("rating").await.unwrap(), vec!["a"]);

        let stats = task.stop().await;
        assert!(stats.reports >= 10);
        assert_eq!(stats.failures, 0);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(store.lookup("rating").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_counted_and_loop_continues() {
        let registry = Registry::new(Arc::new(InMemoryDiscoveryStore::default()));
        let root = CancellationToken::new();
        // Never registered: every report fails.
        let task = HeartbeatTask::spawn(
            registry,
            "ghost-1".to_string(),
            "rating".to_string(),
            config(100),
            &root,
        );

        tokio::time::sleep(Duration::from_millis(550)).await;
        assert!(!task.is_finished());

        let stats = task.stop().await;
        assert_eq!(stats.reports, 0);
        assert!(stats.failures >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_stops_the_loop() {
        let registry = Registry::new(Arc::new(InMemoryDiscoveryStore::default()));
        registry.register("rating-1", "rating", "a").await.unwrap();
        let root = CancellationToken::new();
        let task = HeartbeatTask::spawn(
            registry,
            "rating-1".to_string(),
            "rating".to_string(),
            config(100),
            &root,
        );

        root.cancel();
        let stats = task.join().await;
        assert!(stats.reports <= 1);
    }
}
