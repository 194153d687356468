//! In-Memory Ordered Store
//!
//! A thread-safe, ordered key-value store that implements [`OrderedStore`].
//! It backs the tests, the benchmarks and the demo binary, and shows the
//! guarantees a real backend has to give the TTL layer.
//!
//! ## Design Decisions
//!
//! 1. **One ordered map**: A `BTreeMap` keeps keys in byte order, which is
//!    what makes the expiration index's range scan work. Hash sharding would
//!    lose that order, so there is a single map behind one lock.
//! 2. **RwLock**: Many concurrent readers, exclusive writers. A batch holds
//!    the write lock for its whole duration, which makes it atomic.
//! 3. **Snapshot scans**: A scan copies the matching range under the read
//!    lock and then yields it lazily, so writes that land after the scan
//!    started are never observed by it.

use crate::error::{StoreError, StoreResult};
use crate::store::{BatchOp, KeyRange, OrderedStore, ScanStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// An ordered in-memory key-value store.
///
/// # Example
///
/// ```
/// use ttlkv::store::{MemoryStore, OrderedStore};
/// use bytes::Bytes;
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::new();
/// store.put(Bytes::from("name"), Bytes::from("Ariz")).await.unwrap();
/// assert_eq!(store.get(b"name").await.unwrap(), Bytes::from("Ariz"));
/// # });
/// ```
pub struct MemoryStore {
    /// The ordered data
    data: RwLock<BTreeMap<Bytes, Bytes>>,

    /// Set once `close()` has been called
    closed: AtomicBool,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total PUT operations (including batch puts)
    put_count: AtomicU64,

    /// Statistics: total DELETE operations (including batch deletes)
    del_count: AtomicU64,

    /// Statistics: total batches applied
    batch_count: AtomicU64,

    /// Statistics: total range scans started
    scan_count: AtomicU64,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys", &self.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("put_count", &self.put_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
            get_count: AtomicU64::new(0),
            put_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            batch_count: AtomicU64::new(0),
            scan_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<Bytes, Bytes>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<Bytes, Bytes>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    /// Returns the number of keys, user data and metadata alike.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.read().contains_key(key)
    }

    /// Returns every key in order. Intended for inspection and tests.
    pub fn keys(&self) -> Vec<Bytes> {
        self.read().keys().cloned().collect()
    }

    /// Returns true once `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns operation statistics.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            keys: self.len() as u64,
            get_ops: self.get_count.load(Ordering::Relaxed),
            put_ops: self.put_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            batches: self.batch_count.load(Ordering::Relaxed),
            scans: self.scan_count.load(Ordering::Relaxed),
        }
    }

    /// Copies the entries inside `range` while holding the read lock.
    fn snapshot(&self, range: &KeyRange) -> Vec<(Bytes, Bytes)> {
        if range.start >= range.end {
            return Vec::new();
        }
        let bounds = (
            Bound::Included(&range.start[..]),
            Bound::Excluded(&range.end[..]),
        );
        self.read()
            .range::<[u8], _>(bounds)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[async_trait]
impl OrderedStore for MemoryStore {
    async fn get(&self, key: &[u8]) -> StoreResult<Bytes> {
        self.ensure_open()?;
        self.get_count.fetch_add(1, Ordering::Relaxed);
        self.read().get(key).cloned().ok_or(StoreError::NotFound)
    }

    async fn put(&self, key: Bytes, value: Bytes) -> StoreResult<()> {
        self.ensure_open()?;
        self.put_count.fetch_add(1, Ordering::Relaxed);
        self.write().insert(key, value);
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.ensure_open()?;
        self.del_count.fetch_add(1, Ordering::Relaxed);
        self.write().remove(key);
        Ok(())
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> StoreResult<()> {
        self.ensure_open()?;
        self.batch_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.write();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    self.put_count.fetch_add(1, Ordering::Relaxed);
                    data.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    self.del_count.fetch_add(1, Ordering::Relaxed);
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan(&self, range: KeyRange) -> ScanStream<'_> {
        if let Err(e) = self.ensure_open() {
            return stream::once(async move { Err(e) }).boxed();
        }
        self.scan_count.fetch_add(1, Ordering::Relaxed);
        stream::iter(self.snapshot(&range).into_iter().map(Ok)).boxed()
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Store statistics.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Number of keys currently stored
    pub keys: u64,
    /// Total GET operations
    pub get_ops: u64,
    /// Total PUT operations
    pub put_ops: u64,
    /// Total DELETE operations
    pub del_ops: u64,
    /// Total batches applied
    pub batches: u64,
    /// Total range scans started
    pub scans: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryStore::new();

        store.put(Bytes::from("key"), Bytes::from("value")).await.unwrap();
        assert_eq!(store.get(b"key").await.unwrap(), Bytes::from("value"));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get(b"missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();

        store.put(Bytes::from("key"), Bytes::from("value")).await.unwrap();
        store.delete(b"key").await.unwrap();
        assert!(store.get(b"key").await.unwrap_err().is_not_found());

        // Deleting again is fine
        store.delete(b"key").await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_applies_in_order() {
        let store = MemoryStore::new();

        store
            .batch(vec![
                BatchOp::put("a", "1"),
                BatchOp::put("b", "2"),
                BatchOp::delete("a"),
                BatchOp::put("b", "3"),
            ])
            .await
            .unwrap();

        assert!(!store.contains_key(b"a"));
        assert_eq!(store.get(b"b").await.unwrap(), Bytes::from("3"));
        assert_eq!(store.stats().batches, 1);
    }

    #[tokio::test]
    async fn test_scan_is_ordered_and_half_open() {
        let store = MemoryStore::new();
        for key in ["d", "a", "c", "b", "e"] {
            store.put(Bytes::from(key), Bytes::from(key)).await.unwrap();
        }

        let keys: Vec<Bytes> = store
            .scan(KeyRange::new("b", "e"))
            .map(|r| r.unwrap().0)
            .collect()
            .await;

        assert_eq!(keys, vec![Bytes::from("b"), Bytes::from("c"), Bytes::from("d")]);
    }

    #[tokio::test]
    async fn test_scan_empty_or_inverted_range() {
        let store = MemoryStore::new();
        store.put(Bytes::from("a"), Bytes::from("1")).await.unwrap();

        assert_eq!(store.scan(KeyRange::new("b", "b")).count().await, 0);
        assert_eq!(store.scan(KeyRange::new("z", "a")).count().await, 0);
    }

    #[tokio::test]
    async fn test_scan_is_a_snapshot() {
        let store = MemoryStore::new();
        store.put(Bytes::from("a"), Bytes::from("1")).await.unwrap();

        let mut scan = store.scan(KeyRange::new("a", "z"));
        store.put(Bytes::from("b"), Bytes::from("2")).await.unwrap();

        let mut seen = Vec::new();
        while let Some(entry) = scan.next().await {
            seen.push(entry.unwrap().0);
        }
        assert_eq!(seen, vec![Bytes::from("a")]);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_operations() {
        let store = MemoryStore::new();
        store.close().await.unwrap();

        assert!(store.is_closed());
        assert!(matches!(
            store.put(Bytes::from("k"), Bytes::from("v")).await,
            Err(StoreError::Closed)
        ));
        let first = store.scan(KeyRange::new("a", "z")).next().await;
        assert!(matches!(first, Some(Err(StoreError::Closed))));
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryStore::new());
        let mut handles = vec![];

        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                tokio_test::block_on(async {
                    for j in 0..100 {
                        let key = Bytes::from(format!("key-{}-{}", i, j));
                        store.put(key.clone(), Bytes::from("value")).await.unwrap();
                        store.get(&key).await.unwrap();
                    }
                });
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 1000);
    }
}
