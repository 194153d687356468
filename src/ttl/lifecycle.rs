//! Sweep Lifecycle
//!
//! A sweep holds a live range scan over the store, and a store must not be
//! closed under an open scan. Stopping is therefore deferred rather than
//! preemptive: a stop that arrives mid-sweep is recorded and takes effect
//! once the sweep is back to idle.
//!
//! ## State Machine
//!
//! ```text
//!            tick                 scan done
//!   ┌──────┐ ────> ┌──────────┐ ──────────> ┌──────────┐
//!   │ Idle │       │ Scanning │             │ Applying │
//!   └──────┘ <──── └──────────┘             └──────────┘
//!     │  ▲   scan failed                          │
//!     │  └────────────────────────────────────────┘
//!     │              batches done (no stop requested)
//!     │
//!     │ stop()                 batches done, stop requested
//!     ▼                                   │
//!   ┌─────────┐ <─────────────────────────┘
//!   │ Stopped │
//!   └─────────┘
//! ```
//!
//! All transitions happen under one mutex, which is never held across an
//! await. Waiters are released through a `watch` channel that flips to
//! `true` exactly once.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::debug;

/// Where the sweeper currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    /// Waiting for the next tick.
    Idle,
    /// Reading the reverse index.
    Scanning,
    /// Issuing the delete batches.
    Applying,
    /// Shut down; no further sweeps will run.
    Stopped,
}

impl SweepPhase {
    /// Returns true while a sweep is in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, SweepPhase::Scanning | SweepPhase::Applying)
    }
}

#[derive(Debug)]
struct State {
    phase: SweepPhase,
    stop_requested: bool,
}

/// Coordinates sweeps with stop requests.
///
/// Only the sweeper drives the transitions; other callers can observe the
/// phase and stop it.
///
/// ```compile_fail
/// let lifecycle = ttlkv::ttl::Lifecycle::new();
/// lifecycle.begin_sweep();
/// ```
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<State>,
    stopped: watch::Sender<bool>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Creates a lifecycle in the `Idle` phase.
    pub fn new() -> Self {
        let (stopped, _) = watch::channel(false);
        Self {
            state: Mutex::new(State {
                phase: SweepPhase::Idle,
                stop_requested: false,
            }),
            stopped,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current phase.
    pub fn phase(&self) -> SweepPhase {
        self.lock().phase
    }

    /// Returns true if a stop is waiting for the in-flight sweep.
    pub fn is_stop_pending(&self) -> bool {
        self.lock().stop_requested
    }

    /// Returns a receiver that turns `true` once the lifecycle is stopped.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.stopped.subscribe()
    }

    /// `Idle -> Scanning`. Returns false if a sweep is running or the
    /// lifecycle is stopped.
    pub(crate) fn begin_sweep(&self) -> bool {
        let mut state = self.lock();
        if state.phase == SweepPhase::Idle {
            state.phase = SweepPhase::Scanning;
            true
        } else {
            false
        }
    }

    /// `Scanning -> Applying`.
    pub(crate) fn begin_apply(&self) {
        let mut state = self.lock();
        if state.phase == SweepPhase::Scanning {
            state.phase = SweepPhase::Applying;
        }
    }

    /// Ends the in-flight sweep. Honors a deferred stop, in which case the
    /// lifecycle ends up `Stopped` and this returns true.
    pub(crate) fn finish_sweep(&self) -> bool {
        let mut state = self.lock();
        if !state.phase.is_busy() {
            return state.phase == SweepPhase::Stopped;
        }
        if state.stop_requested {
            state.stop_requested = false;
            state.phase = SweepPhase::Stopped;
            drop(state);
            debug!("Deferred stop honored after sweep");
            self.stopped.send_replace(true);
            true
        } else {
            state.phase = SweepPhase::Idle;
            false
        }
    }

    /// Stops immediately if idle, otherwise records a deferred stop.
    ///
    /// Returns true if the lifecycle is stopped when this returns. Repeated
    /// requests during one sweep collapse into a single pending stop.
    pub(crate) fn request_stop(&self) -> bool {
        let mut state = self.lock();
        match state.phase {
            SweepPhase::Stopped => true,
            SweepPhase::Idle => {
                state.phase = SweepPhase::Stopped;
                drop(state);
                self.stopped.send_replace(true);
                true
            }
            SweepPhase::Scanning | SweepPhase::Applying => {
                state.stop_requested = true;
                false
            }
        }
    }

    /// Stops the lifecycle, waiting for an in-flight sweep to complete.
    ///
    /// Every caller resolves exactly once, after the lifecycle is stopped.
    pub async fn stop(&self) {
        let mut stopped = self.subscribe();
        if self.request_stop() {
            return;
        }
        // Err only if the sender is gone, and it lives as long as `self`.
        let _ = stopped.wait_for(|stopped| *stopped).await;
    }
}
