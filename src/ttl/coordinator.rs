//! Mutation Coordinator
//!
//! [`TtlStore`] wraps an [`OrderedStore`] and mirrors its write primitives.
//! Every write that carries a TTL also updates the expiration index, and
//! every delete also clears it.
//!
//! ## Write Path
//!
//! ```text
//!   put(key, value, ttl)
//!        │
//!        ├──────────────────────────────┐
//!        ▼                              ▼
//!   ┌──────────────────────────┐   ┌──────────────┐
//!   │ index: clear old pair,   │   │ store.put    │
//!   │        set new pair      │   │              │
//!   │ (one batch)              │   │              │
//!   └────────────┬─────────────┘   └──────┬───────┘
//!                │ failure -> event       │ failure -> caller
//!                └──────────┬─────────────┘
//!                           ▼
//!                       join, return
//! ```
//!
//! The index update and the primary write run concurrently and are both
//! awaited before the call returns. Neither rolls back the other. The
//! primary store is authoritative for data; the index only decides when
//! data is eventually deleted, so index failures are published as
//! [`TtlEvent`](crate::ttl::TtlEvent)s instead of failing the call.

use crate::config::TtlConfig;
use crate::error::{Result, TtlError};
use crate::store::{BatchOp, OrderedStore};
use crate::ttl::events::{EventBus, TtlEvent};
use crate::ttl::index::{duration_ms, now_ms, ExpirationIndex, KeyCodec};
use crate::ttl::lifecycle::SweepPhase;
use crate::ttl::stats::{TtlMetrics, TtlStats};
use crate::ttl::sweeper::{ExpirySweeper, SweepReport};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Per-call write options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// `None` uses the configured default TTL. `Some(Duration::ZERO)` writes
    /// without a TTL even when a default is configured.
    pub ttl: Option<Duration>,
}

impl WriteOptions {
    /// Options that expire the written keys after `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }

    /// Options that opt out of the default TTL.
    pub fn no_ttl() -> Self {
        Self {
            ttl: Some(Duration::ZERO),
        }
    }
}

/// State shared by the coordinator and the background sweeper.
pub(crate) struct Context<S> {
    pub(crate) store: Arc<S>,
    pub(crate) index: ExpirationIndex,
    pub(crate) events: EventBus,
    pub(crate) metrics: Arc<TtlMetrics>,
}

impl<S> Clone for Context<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            index: self.index.clone(),
            events: self.events.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<S: OrderedStore> Context<S> {
    /// Counts and publishes a non-fatal error.
    pub(crate) fn report(&self, err: TtlError) {
        let counter = match &err {
            TtlError::Index(_) => &self.metrics.index_errors,
            TtlError::Scan(_) => &self.metrics.scan_errors,
            _ => &self.metrics.data_errors,
        };
        TtlMetrics::add(counter, 1);
        self.events.emit_error(err);
    }

    /// Tracks `keys` until `now + ttl`, replacing any earlier deadline.
    ///
    /// The deletes for the old pair and the puts for the new pair go out as
    /// one batch, so a key never ends up with half a pair.
    pub(crate) async fn ttl_on(&self, keys: &[Bytes], ttl: Duration) {
        let expires_at = now_ms().saturating_add(duration_ms(ttl));

        let plan = self.index.clear_expiry(&*self.store, keys).await;
        for err in plan.errors {
            self.report(TtlError::Index(err));
        }

        let set = self.index.set_expiry(keys, expires_at);
        // One reverse and one forward put per distinct key
        let tracked = (set.len() / 2) as u64;
        let mut ops = plan.ops;
        ops.extend(set);
        if ops.is_empty() {
            return;
        }

        match self.store.batch(ops).await {
            Ok(()) => {
                TtlMetrics::add(&self.metrics.keys_tracked, tracked);
                trace!(keys = tracked, expires_at, "Expiry set");
            }
            Err(e) => self.report(TtlError::Index(e)),
        }
    }

    /// Stops tracking `keys`. Untracked keys are ignored.
    pub(crate) async fn ttl_off(&self, keys: &[Bytes]) {
        let plan = self.index.clear_expiry(&*self.store, keys).await;
        for err in plan.errors {
            self.report(TtlError::Index(err));
        }
        if plan.ops.is_empty() {
            return;
        }

        match self.store.batch(plan.ops).await {
            Ok(()) => {
                TtlMetrics::add(&self.metrics.keys_cleared, plan.cleared as u64);
                trace!(keys = plan.cleared, "Expiry cleared");
            }
            Err(e) => self.report(TtlError::Index(e)),
        }
    }
}

/// An ordered store with key expiration.
///
/// Cloning is cheap; all clones share one store, one index and one
/// background sweeper. The sweeper stops when [`stop`](Self::stop) or
/// [`close`](Self::close) is called, or when the last clone is dropped.
///
/// # Example
///
/// ```
/// use ttlkv::{MemoryStore, TtlConfig, TtlStore, WriteOptions};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ttlkv::Result<()> {
/// let db = TtlStore::open(MemoryStore::new(), TtlConfig::default())?;
///
/// db.put("session", "token123", WriteOptions::with_ttl(Duration::from_secs(60)))
///     .await?;
/// assert!(db.expires_at("session").await?.is_some());
///
/// db.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct TtlStore<S: OrderedStore> {
    ctx: Context<S>,
    default_ttl: Option<Duration>,
    sweeper: Arc<ExpirySweeper>,
}

impl<S: OrderedStore> Clone for TtlStore<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            default_ttl: self.default_ttl,
            sweeper: Arc::clone(&self.sweeper),
        }
    }
}

impl<S: OrderedStore> std::fmt::Debug for TtlStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlStore")
            .field("index", &self.ctx.index)
            .field("default_ttl", &self.default_ttl)
            .field("phase", &self.phase())
            .finish()
    }
}

impl<S: OrderedStore> TtlStore<S> {
    /// Wraps `store` and starts the background sweeper.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(store: S, config: TtlConfig) -> Result<Self> {
        config.validate()?;

        let ctx = Context {
            store: Arc::new(store),
            index: ExpirationIndex::new(KeyCodec::from_config(&config)),
            events: EventBus::new(),
            metrics: Arc::new(TtlMetrics::default()),
        };
        let sweeper = ExpirySweeper::start(ctx.clone(), config.check_frequency);

        info!(
            namespace = %config.namespace,
            check_frequency_ms = duration_ms(config.check_frequency),
            default_ttl_ms = config.default_ttl.map(duration_ms),
            "TTL layer attached"
        );

        Ok(Self {
            ctx,
            default_ttl: config.default_ttl,
            sweeper: Arc::new(sweeper),
        })
    }

    /// The TTL a write with `options` ends up with.
    fn effective_ttl(&self, options: &WriteOptions) -> Option<Duration> {
        match options.ttl {
            Some(ttl) if ttl.is_zero() => None,
            Some(ttl) => Some(ttl),
            None => self.default_ttl,
        }
    }

    /// The wrapped store, for reads and writes that bypass the TTL layer.
    pub fn store(&self) -> &S {
        &self.ctx.store
    }

    /// A shared handle to the wrapped store that outlives this `TtlStore`.
    pub fn shared_store(&self) -> Arc<S> {
        Arc::clone(&self.ctx.store)
    }

    /// The expiration index used by this store.
    pub fn index(&self) -> &ExpirationIndex {
        &self.ctx.index
    }

    /// Reads a key from the wrapped store.
    pub async fn get(&self, key: impl AsRef<[u8]>) -> Result<Bytes> {
        self.ctx
            .store
            .get(key.as_ref())
            .await
            .map_err(TtlError::primary)
    }

    /// Writes a key, tracking its expiry if a TTL applies.
    ///
    /// Only primary-store failures are returned.
    pub async fn put(
        &self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        options: WriteOptions,
    ) -> Result<()> {
        let key = key.into();
        let value = value.into();

        let Some(ttl) = self.effective_ttl(&options) else {
            return self.ctx.store.put(key, value).await.map_err(TtlError::primary);
        };

        let keys = [key.clone()];
        let ((), primary) = tokio::join!(
            self.ctx.ttl_on(&keys, ttl),
            self.ctx.store.put(key, value)
        );
        primary.map_err(TtlError::primary)
    }

    /// Deletes a key and clears its expiry tracking.
    pub async fn delete(&self, key: impl Into<Bytes>) -> Result<()> {
        let key = key.into();
        let keys = [key.clone()];

        let ((), primary) = tokio::join!(self.ctx.ttl_off(&keys), self.ctx.store.delete(&key));
        primary.map_err(TtlError::primary)
    }

    /// Applies `ops` atomically on the wrapped store.
    ///
    /// Puts are tracked with the effective TTL of `options` (if any) and
    /// deletes have their tracking cleared. The operation list reaches the
    /// store unmodified.
    pub async fn batch(&self, ops: Vec<BatchOp>, options: WriteOptions) -> Result<()> {
        let ttl = self.effective_ttl(&options);

        let mut on = Vec::new();
        let mut off = Vec::new();
        for op in &ops {
            match op {
                BatchOp::Put { key, .. } if ttl.is_some() => on.push(key.clone()),
                BatchOp::Put { .. } => {}
                BatchOp::Delete { key } => off.push(key.clone()),
            }
        }

        let set = async {
            if let Some(ttl) = ttl.filter(|_| !on.is_empty()) {
                self.ctx.ttl_on(&on, ttl).await;
            }
        };
        let clear = async {
            if !off.is_empty() {
                self.ctx.ttl_off(&off).await;
            }
        };

        let ((), (), primary) = tokio::join!(set, clear, self.ctx.store.batch(ops));
        primary.map_err(TtlError::primary)
    }

    /// Sets or renews the TTL of `key` without touching its value.
    ///
    /// A zero `ttl` is ignored. Index failures are published as events.
    pub async fn ttl(&self, key: impl Into<Bytes>, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let key: Bytes = key.into();
        self.ctx.ttl_on(&[key], ttl).await;
    }

    /// Removes the TTL of `key`, keeping its value.
    pub async fn clear_ttl(&self, key: impl Into<Bytes>) {
        let key: Bytes = key.into();
        self.ctx.ttl_off(&[key]).await;
    }

    /// The tracked expiry of `key` in Unix milliseconds, if any.
    pub async fn expires_at(&self, key: impl AsRef<[u8]>) -> Result<Option<u64>> {
        self.ctx
            .index
            .expiry_of(&*self.ctx.store, key.as_ref())
            .await
            .map_err(TtlError::Index)
    }

    /// Runs one sweep right away.
    ///
    /// Returns `None` if a sweep is already in flight or the sweeper has
    /// been stopped.
    pub async fn sweep(&self) -> Option<SweepReport> {
        self.sweeper.sweep_now(&self.ctx).await
    }

    /// Subscribes to background errors and sweep reports.
    pub fn subscribe(&self) -> broadcast::Receiver<TtlEvent> {
        self.ctx.events.subscribe()
    }

    /// Returns TTL layer statistics.
    pub fn stats(&self) -> TtlStats {
        self.ctx.metrics.snapshot()
    }

    /// The sweeper's current phase.
    pub fn phase(&self) -> SweepPhase {
        self.sweeper.phase()
    }

    /// Stops the sweeper, waiting for an in-flight sweep to finish first.
    pub async fn stop(&self) {
        self.sweeper.stop().await;
    }

    /// Stops the sweeper, then closes the wrapped store.
    ///
    /// The store is never closed while a sweep is scanning it.
    pub async fn close(&self) -> Result<()> {
        self.stop().await;
        self.ctx.store.close().await.map_err(TtlError::Primary)?;
        debug!("Wrapped store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const HOUR: Duration = Duration::from_secs(3600);

    fn open() -> TtlStore<MemoryStore> {
        TtlStore::open(
            MemoryStore::new(),
            TtlConfig::default().with_check_frequency(HOUR),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_without_ttl_is_untracked() {
        let db = open();

        db.put("key", "value", WriteOptions::default()).await.unwrap();

        assert_eq!(db.get("key").await.unwrap(), Bytes::from("value"));
        assert_eq!(db.expires_at("key").await.unwrap(), None);
        assert_eq!(db.store().len(), 1);
    }

    #[tokio::test]
    async fn test_put_with_ttl_tracks_expiry() {
        let db = open();
        let before = now_ms();

        db.put("key", "value", WriteOptions::with_ttl(Duration::from_secs(60)))
            .await
            .unwrap();

        let expires_at = db.expires_at("key").await.unwrap().unwrap();
        assert!(expires_at >= before + 60_000);
        assert!(expires_at <= now_ms() + 60_000);
        // value + forward + reverse
        assert_eq!(db.store().len(), 3);
        assert_eq!(db.stats().keys_tracked, 1);
    }

    #[tokio::test]
    async fn test_default_ttl_and_exemption() {
        let db = TtlStore::open(
            MemoryStore::new(),
            TtlConfig::default()
                .with_check_frequency(HOUR)
                .with_default_ttl(Duration::from_secs(30)),
        )
        .unwrap();

        db.put("defaulted", "v", WriteOptions::default()).await.unwrap();
        db.put("exempt", "v", WriteOptions::no_ttl()).await.unwrap();

        assert!(db.expires_at("defaulted").await.unwrap().is_some());
        assert!(db.expires_at("exempt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_renewal_replaces_deadline() {
        let db = open();

        db.put("key", "v", WriteOptions::with_ttl(HOUR)).await.unwrap();
        db.ttl("key", Duration::from_secs(5)).await;

        let expires_at = db.expires_at("key").await.unwrap().unwrap();
        assert!(expires_at <= now_ms() + 5_000);
        // Still exactly one pair
        assert_eq!(db.store().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_clears_tracking() {
        let db = open();

        db.put("key", "v", WriteOptions::with_ttl(HOUR)).await.unwrap();
        db.delete("key").await.unwrap();

        assert!(db.get("key").await.unwrap_err().is_not_found());
        assert_eq!(db.expires_at("key").await.unwrap(), None);
        assert!(db.store().is_empty());
    }

    #[tokio::test]
    async fn test_clear_ttl_keeps_value() {
        let db = open();

        db.put("key", "v", WriteOptions::with_ttl(HOUR)).await.unwrap();
        db.clear_ttl("key").await;
        db.clear_ttl("never-tracked").await;

        assert_eq!(db.get("key").await.unwrap(), Bytes::from("v"));
        assert_eq!(db.expires_at("key").await.unwrap(), None);
        assert_eq!(db.store().len(), 1);
        assert_eq!(db.stats().keys_cleared, 1);
        assert_eq!(db.stats().index_errors, 0);
    }

    #[tokio::test]
    async fn test_zero_ttl_call_is_ignored() {
        let db = open();

        db.put("key", "v", WriteOptions::default()).await.unwrap();
        db.ttl("key", Duration::ZERO).await;

        assert_eq!(db.expires_at("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_batch_partitions_puts_and_deletes() {
        let db = open();
        db.put("old", "v", WriteOptions::with_ttl(HOUR)).await.unwrap();

        db.batch(
            vec![BatchOp::delete("old"), BatchOp::put("new", "v")],
            WriteOptions::with_ttl(HOUR),
        )
        .await
        .unwrap();

        assert!(db.expires_at("new").await.unwrap().is_some());
        assert!(db.expires_at("old").await.unwrap().is_none());
        assert!(db.get("old").await.unwrap_err().is_not_found());
        assert_eq!(db.store().len(), 3);
    }

    #[tokio::test]
    async fn test_close_rejects_later_writes() {
        let db = open();
        db.close().await.unwrap();

        assert_eq!(db.phase(), SweepPhase::Stopped);
        let err = db.put("k", "v", WriteOptions::default()).await.unwrap_err();
        assert!(matches!(err, TtlError::Primary(_)));
    }

    #[tokio::test]
    async fn test_huge_ttl_saturates_instead_of_wrapping() {
        let db = open();

        let forever = Duration::from_secs(u64::MAX / 1000 + 1);
        db.put("key", "v", WriteOptions::with_ttl(forever)).await.unwrap();

        assert_eq!(db.expires_at("key").await.unwrap(), Some(u64::MAX));
        let report = db.sweep().await.unwrap();
        assert_eq!(report.expired, 0);
        assert_eq!(db.get("key").await.unwrap(), Bytes::from("v"));
    }

    #[tokio::test]
    async fn test_repeated_batch_keys_tracked_once() {
        let db = open();

        db.batch(
            vec![BatchOp::put("dup", "1"), BatchOp::put("dup", "2")],
            WriteOptions::with_ttl(HOUR),
        )
        .await
        .unwrap();

        assert_eq!(db.stats().keys_tracked, 1);
        assert_eq!(db.get("dup").await.unwrap(), Bytes::from("2"));
        // value + forward + reverse
        assert_eq!(db.store().len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let result = TtlStore::open(MemoryStore::new(), TtlConfig::new(""));
        assert!(matches!(result, Err(TtlError::Config(_))));
    }
}
