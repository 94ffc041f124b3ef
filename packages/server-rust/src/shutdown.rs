//! Drain gate for one service instance.
//!
//! Health transitions go through an `ArcSwap` so the request path reads them
//! without locking. Admitted calls hold an [`InFlightGuard`]; the last guard
//! to drop wakes whoever is waiting in [`ShutdownController::wait_for_drain`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::Notify;
use tracing::debug;

/// Lifecycle of a service instance: Starting -> Ready -> Draining -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Bound but not yet registered; calls are refused.
    Starting,
    /// Registered and serving.
    Ready,
    /// Admission stopped; in-flight calls may still finish.
    Draining,
    Stopped,
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicU64,
    drained: Notify,
}

/// Tracks health state and in-flight calls of one instance.
#[derive(Debug)]
pub struct ShutdownController {
    state: ArcSwap<HealthState>,
    in_flight: Arc<InFlight>,
}

impl ShutdownController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(HealthState::Starting),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn set_ready(&self) {
        self.transition(HealthState::Ready);
    }

    /// Stops admitting calls. Calls already admitted keep running.
    pub fn trigger_shutdown(&self) {
        self.transition(HealthState::Draining);
    }

    /// Marks the instance stopped even if calls are still running.
    pub fn force_stop(&self) {
        self.transition(HealthState::Stopped);
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.state.load()
    }

    /// `true` only while `Ready`.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.health_state() == HealthState::Ready
    }

    /// Counts a call as in flight until the returned guard is dropped.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Waits until no call is in flight, for at most `grace_period`.
    ///
    /// Returns `true` and moves to `Stopped` once drained; returns `false`
    /// (state unchanged) if the grace period ran out first.
    pub async fn wait_for_drain(&self, grace_period: Duration) -> bool {
        let drained = tokio::time::timeout(grace_period, async {
            loop {
                // Register interest before checking, so a guard dropped in
                // between cannot be missed.
                let notified = self.in_flight.drained.notified();
                if self.in_flight_count() == 0 {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok();

        if drained {
            self.transition(HealthState::Stopped);
        }
        drained
    }

    fn transition(&self, next: HealthState) {
        let previous = self.state.swap(Arc::new(next));
        if *previous != next {
            debug!(from = ?*previous, to = ?next, "health state changed");
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII marker of one in-flight call. Dropping it, including during
/// unwinding, releases the call.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.in_flight.drained.notify_waiters();
        }
    }
}
