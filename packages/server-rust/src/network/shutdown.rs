//! Server lifecycle with in-flight call tracking.
//!
//! The lifecycle state lives in an `ArcSwap` so readiness probes and the
//! daemon-serving health check read it without locking. In-flight calls are
//! counted by RAII guards; the last guard to drop wakes drain waiters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{watch, Notify};
use tollgate_core::health::Daemon;

/// Server lifecycle state.
///
/// Transitions: Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Listeners are being set up; no calls are accepted yet.
    Starting,
    /// Serving calls.
    Ready,
    /// Shutdown was requested; in-flight calls are finishing.
    Draining,
    /// Every in-flight call completed.
    Stopped,
}

impl LifecycleState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicU64,
    drained: Notify,
}

/// Owns the lifecycle state, the shutdown signal and the in-flight count.
///
/// 1. `set_ready()` once listeners are bound
/// 2. the call transport holds an [`InFlightGuard`] per call
/// 3. `trigger_shutdown()` moves to `Draining` and wakes shutdown listeners
/// 4. `wait_for_drain()` returns once the count reaches zero or time runs out
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    in_flight: Arc<InFlight>,
    state: ArcSwap<LifecycleState>,
}

impl ShutdownController {
    /// Creates a controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shutdown_signal: tx,
            in_flight: Arc::new(InFlight::default()),
            state: ArcSwap::from_pointee(LifecycleState::Starting),
        }
    }

    /// Marks the server as serving. Ignored once shutdown has started.
    pub fn set_ready(&self) {
        self.state.rcu(|current| match **current {
            LifecycleState::Starting | LifecycleState::Ready => Arc::new(LifecycleState::Ready),
            other => Arc::new(other),
        });
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        **self.state.load()
    }

    /// Moves to `Draining` and signals every shutdown listener.
    pub fn trigger_shutdown(&self) {
        self.state.rcu(|current| match **current {
            LifecycleState::Stopped => Arc::new(LifecycleState::Stopped),
            _ => Arc::new(LifecycleState::Draining),
        });
        // Receivers may all be gone.
        let _ = self.shutdown_signal.send(true);
    }

    /// Resolves once `trigger_shutdown()` has been called.
    pub async fn shutdown_requested(&self) {
        let mut rx = self.shutdown_signal.subscribe();
        // The sender lives as long as `self`, so this cannot fail while awaited.
        let _ = rx.wait_for(|requested| *requested).await;
    }

    /// Counts one call as in flight until the guard drops.
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

    /// Waits up to `timeout` for in-flight calls to finish.
    ///
    /// Returns `true` and moves to `Stopped` when the count reached zero,
    /// `false` (state unchanged) on timeout.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, async {
            loop {
                let notified = self.in_flight.drained.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.in_flight_count() == 0 {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok();

        if drained {
            self.state.store(Arc::new(LifecycleState::Stopped));
        }
        drained
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon for ShutdownController {
    fn serving(&self) -> bool {
        self.state() == LifecycleState::Ready
    }
}

/// Decrements the in-flight count on drop, including during unwinding.
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
