//! Ordered Key-Value Store Contract
//!
//! The TTL layer never owns data itself. It sits in front of any store that
//! can do point lookups, writes, atomic batches and ordered range scans.
//! This module defines that contract as the [`OrderedStore`] trait, plus an
//! in-memory implementation used by tests, benches and the demo binary.
//!
//! ## Contract
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     OrderedStore                            │
//! │                                                             │
//! │  get(key)        -> value | NotFound | other error          │
//! │  put(key, value)                                            │
//! │  delete(key)                                                │
//! │  batch([Put|Delete, ...])   atomic, applied in order        │
//! │  scan(start..end)           ordered, start incl, end excl   │
//! │  close()                                                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod memory;

pub use memory::{MemoryStore, StoreStats};

use crate::error::StoreResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

/// A lazy, ordered sequence of key-value pairs produced by a range scan.
pub type ScanStream<'a> = BoxStream<'a, StoreResult<(Bytes, Bytes)>>;

/// One entry of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Write `value` under `key`.
    Put { key: Bytes, value: Bytes },
    /// Remove `key`.
    Delete { key: Bytes },
}

impl BatchOp {
    /// Creates a put entry.
    pub fn put(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        BatchOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates a delete entry.
    pub fn delete(key: impl Into<Bytes>) -> Self {
        BatchOp::Delete { key: key.into() }
    }

    /// The key this entry touches.
    pub fn key(&self) -> &Bytes {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// A half-open key range: `start` is inclusive, `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Bytes,
    pub end: Bytes,
}

impl KeyRange {
    /// Creates a range covering `start <= key < end`.
    pub fn new(start: impl Into<Bytes>, end: impl Into<Bytes>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Returns true if `key` falls inside the range.
    #[inline]
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= &self.start[..] && key < &self.end[..]
    }
}

/// The capabilities the TTL layer needs from an underlying store.
///
/// Implementations must be safe to share across tasks. Every batch must be
/// applied atomically and in list order, and a scan must see a consistent
/// snapshot taken when it starts.
#[async_trait]
pub trait OrderedStore: Send + Sync + 'static {
    /// Point lookup. A missing key is [`StoreError::NotFound`](crate::error::StoreError::NotFound).
    async fn get(&self, key: &[u8]) -> StoreResult<Bytes>;

    /// Writes a single key.
    async fn put(&self, key: Bytes, value: Bytes) -> StoreResult<()>;

    /// Removes a single key. Removing a missing key is not an error.
    async fn delete(&self, key: &[u8]) -> StoreResult<()>;

    /// Applies all entries as one atomic unit.
    async fn batch(&self, ops: Vec<BatchOp>) -> StoreResult<()>;

    /// Ordered iteration over `range`.
    fn scan(&self, range: KeyRange) -> ScanStream<'_>;

    /// Releases the store. Later operations may fail with `Closed`.
    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}
