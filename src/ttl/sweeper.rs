//! Background Expiry Sweeper
//!
//! Writes only record *when* a key should go away. This module is what
//! actually removes it: a background task wakes up on a fixed interval,
//! range-scans the reverse index for everything due by now, and deletes it.
//!
//! ## One Sweep
//!
//! 1. `Idle -> Scanning`: scan the reverse index up to `now` (inclusive)
//! 2. For every hit, queue the reverse and forward entries into an index
//!    batch and the primary key into a data batch
//! 3. `Scanning -> Applying`: issue both batches concurrently, skipping
//!    empty ones
//! 4. `Applying -> Idle`, or `Stopped` if a stop arrived meanwhile
//!
//! A failed scan abandons the sweep; nothing is deleted and the next tick
//! tries again. Failed batches are published as events. Neither ever stops
//! the schedule.
//!
//! Expiry granularity is the sweep interval: a key can outlive its
//! deadline by up to one interval.

use crate::error::TtlError;
use crate::store::{BatchOp, OrderedStore};
use crate::ttl::coordinator::Context;
use crate::ttl::events::TtlEvent;
use crate::ttl::index::{duration_ms, now_ms};
use crate::ttl::lifecycle::{Lifecycle, SweepPhase};
use crate::ttl::stats::TtlMetrics;
use futures_util::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// The `now` the scan was bounded by (Unix ms).
    pub now: u64,
    /// Keys found due.
    pub expired: u64,
    /// The scan failed and nothing was deleted.
    pub abandoned: bool,
    /// The index batch failed.
    pub index_failed: bool,
    /// The data batch failed.
    pub data_failed: bool,
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper stops after any sweep in flight.
#[derive(Debug)]
pub struct ExpirySweeper {
    lifecycle: Arc<Lifecycle>,
}

impl ExpirySweeper {
    /// Starts the sweeper as a background task ticking every `frequency`.
    ///
    /// The first sweep runs one full interval after start. A Tokio task
    /// never keeps the runtime alive on its own, so an idle sweeper does not
    /// hold up shutdown.
    pub(crate) fn start<S: OrderedStore>(ctx: Context<S>, frequency: Duration) -> Self {
        let lifecycle = Arc::new(Lifecycle::new());
        // Subscribed before the task runs so an early stop is never missed
        let stopped = lifecycle.subscribe();

        tokio::spawn(sweeper_loop(ctx, frequency, Arc::clone(&lifecycle), stopped));

        info!(
            interval_ms = duration_ms(frequency),
            "Background expiry sweeper started"
        );

        Self { lifecycle }
    }

    /// The current phase.
    pub fn phase(&self) -> SweepPhase {
        self.lifecycle.phase()
    }

    /// Runs one sweep outside the schedule, unless one is already running
    /// or the sweeper is stopped.
    pub(crate) async fn sweep_now<S: OrderedStore>(&self, ctx: &Context<S>) -> Option<SweepReport> {
        if !self.lifecycle.begin_sweep() {
            return None;
        }
        let report = sweep_once(ctx, &self.lifecycle).await;
        self.lifecycle.finish_sweep();
        Some(report)
    }

    /// Stops the sweeper. An in-flight sweep completes first.
    pub async fn stop(&self) {
        self.lifecycle.stop().await;
        info!("Background expiry sweeper stopped");
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.lifecycle.request_stop();
    }
}

/// The main sweeper loop.
async fn sweeper_loop<S: OrderedStore>(
    ctx: Context<S>,
    frequency: Duration,
    lifecycle: Arc<Lifecycle>,
    mut stopped: watch::Receiver<bool>,
) {
    let mut ticker = time::interval_at(Instant::now() + frequency, frequency);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // Wait for the interval or shutdown signal
        tokio::select! {
            _ = ticker.tick() => {}
            result = stopped.changed() => {
                if result.is_err() || *stopped.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
                continue;
            }
        }

        if !lifecycle.begin_sweep() {
            if lifecycle.phase() == SweepPhase::Stopped {
                return;
            }
            // A manual sweep is in flight; this tick is covered by it
            trace!("Sweep already in progress, skipping tick");
            continue;
        }

        sweep_once(&ctx, &lifecycle).await;

        if lifecycle.finish_sweep() {
            return;
        }
    }
}

/// Runs one scan-and-delete cycle. The caller owns the `Idle -> Scanning`
/// and the final transition.
pub(crate) async fn sweep_once<S: OrderedStore>(
    ctx: &Context<S>,
    lifecycle: &Lifecycle,
) -> SweepReport {
    let now = now_ms();
    let mut report = SweepReport {
        now,
        ..Default::default()
    };

    let mut index_ops = Vec::new();
    let mut data_ops = Vec::new();
    {
        let mut due = ctx.index.scan_expired(&*ctx.store, now);
        while let Some(entry) = due.next().await {
            match entry {
                Ok(entry) => {
                    index_ops.push(BatchOp::Delete {
                        key: entry.reverse_key,
                    });
                    index_ops.push(BatchOp::Delete {
                        key: entry.forward_key,
                    });
                    data_ops.push(BatchOp::Delete { key: entry.key });
                }
                Err(e) => {
                    report.abandoned = true;
                    TtlMetrics::add(&ctx.metrics.sweeps_abandoned, 1);
                    ctx.report(TtlError::Scan(e));
                    ctx.events.emit(TtlEvent::SweepCompleted(report.clone()));
                    return report;
                }
            }
        }
    }
    report.expired = data_ops.len() as u64;

    lifecycle.begin_apply();

    let index = async {
        if index_ops.is_empty() {
            return Ok(());
        }
        ctx.store.batch(index_ops).await
    };
    let data = async {
        if data_ops.is_empty() {
            return Ok(());
        }
        ctx.store.batch(data_ops).await
    };
    let (index, data) = tokio::join!(index, data);

    if let Err(e) = index {
        report.index_failed = true;
        ctx.report(TtlError::Index(e));
    }
    if let Err(e) = data {
        report.data_failed = true;
        ctx.report(TtlError::Primary(e));
    } else {
        TtlMetrics::add(&ctx.metrics.keys_expired, report.expired);
    }
    TtlMetrics::add(&ctx.metrics.sweeps, 1);

    if report.expired > 0 {
        debug!(
            expired = report.expired,
            now = report.now,
            "Expired keys cleaned up"
        );
    } else {
        trace!(now = report.now, "Sweep found nothing due");
    }

    ctx.events.emit(TtlEvent::SweepCompleted(report.clone()));
    report
}
