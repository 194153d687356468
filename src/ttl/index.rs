//! Expiration Index
//!
//! Two metadata entries are kept for every tracked key:
//!
//! ```text
//! forward:  !ttl!key!<user key>                          -> <expiry ms>
//! reverse:  !ttl!exp!<expiry ms, 20 digits>!<user key>   -> <user key>
//! ```
//!
//! The forward entry answers "when does this key expire?". The reverse entry
//! is ordered by expiry time, so "every key due by `now`" is a single range
//! scan from the reverse prefix up to `pad(now + 1)`. Timestamps are
//! zero-padded to the width of `u64::MAX` because the store only compares
//! bytes: `"00000000000000000999" < "00000000000000001000"` while
//! `"999" > "1000"`.
//!
//! The reverse value is the user key itself, so a sweep never needs a second
//! lookup to find what to delete.
//!
//! Nothing here writes to the store. [`ExpirationIndex::set_expiry`] and
//! [`ExpirationIndex::clear_expiry`] build batch entries; the coordinator
//! decides when and how to apply them.

use crate::config::TtlConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::{BatchOp, KeyRange, OrderedStore};
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::future::join_all;
use futures_util::stream::{Stream, StreamExt};
use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Width of an encoded timestamp: the number of digits in `u64::MAX`.
const TIMESTAMP_WIDTH: usize = 20;

/// Segment marking forward entries inside the namespace.
const FORWARD_SEGMENT: &str = "key";

/// Segment marking reverse entries inside the namespace.
const REVERSE_SEGMENT: &str = "exp";

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(duration_ms)
        .unwrap_or(0)
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
#[inline]
pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Encodes and decodes expiration metadata keys for one namespace.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    /// `<sep><ns><sep>`
    namespace_prefix: Bytes,
    /// `<sep><ns><sep>key<sep>`
    forward_prefix: Bytes,
    /// `<sep><ns><sep>exp<sep>`
    reverse_prefix: Bytes,
    separator: Bytes,
}

impl KeyCodec {
    /// Creates a codec for `namespace` using `separator` between segments.
    pub fn new(namespace: &str, separator: &str) -> Self {
        let namespace_prefix = format!("{separator}{namespace}{separator}");
        Self {
            forward_prefix: Bytes::from(format!(
                "{namespace_prefix}{FORWARD_SEGMENT}{separator}"
            )),
            reverse_prefix: Bytes::from(format!(
                "{namespace_prefix}{REVERSE_SEGMENT}{separator}"
            )),
            namespace_prefix: Bytes::from(namespace_prefix),
            separator: Bytes::copy_from_slice(separator.as_bytes()),
        }
    }

    /// Creates a codec from the namespace and separator of `config`.
    pub fn from_config(config: &TtlConfig) -> Self {
        Self::new(&config.namespace, &config.separator)
    }

    /// Fixed-width decimal encoding that sorts like the number.
    pub fn encode_timestamp(expires_at: u64) -> String {
        format!("{:0width$}", expires_at, width = TIMESTAMP_WIDTH)
    }

    /// Parses a forward-entry value back into an expiry timestamp.
    pub fn decode_expiry(value: &[u8]) -> StoreResult<u64> {
        std::str::from_utf8(value)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or_else(|| {
                StoreError::Corruption(format!(
                    "invalid expiry timestamp {:?}",
                    String::from_utf8_lossy(value)
                ))
            })
    }

    /// Key of the forward entry for `key`.
    pub fn forward_key(&self, key: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.forward_prefix.len() + key.len());
        buf.put_slice(&self.forward_prefix);
        buf.put_slice(key);
        buf.freeze()
    }

    /// Key of the reverse entry for `key` expiring at `expires_at`.
    pub fn reverse_key(&self, expires_at: u64, key: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            self.reverse_prefix.len() + TIMESTAMP_WIDTH + self.separator.len() + key.len(),
        );
        buf.put_slice(&self.reverse_prefix);
        buf.put_slice(Self::encode_timestamp(expires_at).as_bytes());
        buf.put_slice(&self.separator);
        buf.put_slice(key);
        buf.freeze()
    }

    /// The reverse-index range holding every entry with expiry `<= now`.
    pub fn expired_range(&self, now: u64) -> KeyRange {
        let mut end = BytesMut::with_capacity(self.reverse_prefix.len() + TIMESTAMP_WIDTH);
        end.put_slice(&self.reverse_prefix);
        end.put_slice(Self::encode_timestamp(now.saturating_add(1)).as_bytes());
        KeyRange::new(self.reverse_prefix.clone(), end.freeze())
    }

    /// Returns true if `key` belongs to this namespace's metadata.
    pub fn is_metadata(&self, key: &[u8]) -> bool {
        key.starts_with(&self.namespace_prefix)
    }
}

/// A reverse-index hit produced by [`ExpirationIndex::scan_expired`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredEntry {
    /// The primary key that is due.
    pub key: Bytes,
    /// The reverse entry that produced the hit.
    pub reverse_key: Bytes,
    /// The forward entry paired with it.
    pub forward_key: Bytes,
}

/// Index deletes produced by [`ExpirationIndex::clear_expiry`].
#[derive(Debug, Default)]
pub struct ClearPlan {
    /// Delete entries for every tracked key.
    pub ops: Vec<BatchOp>,
    /// Number of keys that were tracked.
    pub cleared: usize,
    /// Lookup failures other than "not found".
    pub errors: Vec<StoreError>,
}

/// Forward and reverse expiration metadata over an [`OrderedStore`].
#[derive(Debug, Clone)]
pub struct ExpirationIndex {
    codec: KeyCodec,
}

impl ExpirationIndex {
    /// Creates an index using `codec` for its keys.
    pub fn new(codec: KeyCodec) -> Self {
        Self { codec }
    }

    /// The codec this index encodes with.
    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Builds the writes that track every key in `keys` until `expires_at`.
    ///
    /// Must be preceded by [`clear_expiry`](Self::clear_expiry) for the same
    /// keys, otherwise a reverse entry from an earlier deadline survives.
    pub fn set_expiry(&self, keys: &[Bytes], expires_at: u64) -> Vec<BatchOp> {
        let value = Bytes::from(expires_at.to_string());
        let mut ops = Vec::with_capacity(keys.len() * 2);
        for key in unique(keys) {
            ops.push(BatchOp::Put {
                key: self.codec.reverse_key(expires_at, key),
                value: key.clone(),
            });
            ops.push(BatchOp::Put {
                key: self.codec.forward_key(key),
                value: value.clone(),
            });
        }
        ops
    }

    /// Builds the deletes that stop tracking every key in `keys`.
    ///
    /// Each forward entry is looked up to recover the reverse key. Untracked
    /// keys contribute nothing. A failed lookup is recorded in the plan and
    /// does not affect the other keys.
    pub async fn clear_expiry<S>(&self, store: &S, keys: &[Bytes]) -> ClearPlan
    where
        S: OrderedStore + ?Sized,
    {
        let keys = unique(keys);
        let lookups = join_all(keys.iter().map(|key| self.expiry_of(store, key))).await;

        let mut plan = ClearPlan::default();
        for (key, lookup) in keys.into_iter().zip(lookups) {
            match lookup {
                Ok(Some(expires_at)) => {
                    plan.ops.push(BatchOp::Delete {
                        key: self.codec.reverse_key(expires_at, key),
                    });
                    plan.ops.push(BatchOp::Delete {
                        key: self.codec.forward_key(key),
                    });
                    plan.cleared += 1;
                }
                Ok(None) => {}
                Err(e) => plan.errors.push(e),
            }
        }
        plan
    }

    /// Reads the expiry timestamp tracked for `key`, if any.
    pub async fn expiry_of<S>(&self, store: &S, key: &[u8]) -> StoreResult<Option<u64>>
    where
        S: OrderedStore + ?Sized,
    {
        match store.get(&self.codec.forward_key(key)).await {
            Ok(value) => KeyCodec::decode_expiry(&value).map(Some),
            Err(StoreError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Lazily yields every tracked key whose expiry is `<= now`, oldest first.
    pub fn scan_expired<'a, S>(
        &self,
        store: &'a S,
        now: u64,
    ) -> impl Stream<Item = StoreResult<ExpiredEntry>> + Send + 'a
    where
        S: OrderedStore + ?Sized,
    {
        let codec = self.codec.clone();
        store
            .scan(self.codec.expired_range(now))
            .map(move |entry| {
                entry.map(|(reverse_key, key)| ExpiredEntry {
                    forward_key: codec.forward_key(&key),
                    reverse_key,
                    key,
                })
            })
    }
}

/// Drops repeated keys, keeping first-seen order.
fn unique(keys: &[Bytes]) -> Vec<&Bytes> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter().filter(|key| seen.insert(*key)).collect()
}
