//! Error Types
//!
//! Two layers of errors exist in ttlkv:
//!
//! - [`StoreError`] is what an [`OrderedStore`](crate::store::OrderedStore)
//!   backend reports. `NotFound` is kept apart from every other kind because
//!   the expiration index treats a missing forward entry as "not tracked".
//! - [`TtlError`] is what the TTL layer reports. It records *which* side of
//!   the layer failed, because the two sides have different propagation
//!   rules: primary-store failures go back to the caller, index and scan
//!   failures are emitted as events and never abort the caller's write.

use thiserror::Error;

/// Result type for store backends.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for the TTL layer.
pub type Result<T> = std::result::Result<T, TtlError>;

/// Errors reported by an ordered key-value store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested key does not exist.
    #[error("key not found")]
    NotFound,

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// I/O errors from the backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be decoded.
    #[error("data corruption detected: {0}")]
    Corruption(String),

    /// Any other backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns true if this is the "missing key" kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// Errors reported by the TTL layer.
#[derive(Error, Debug)]
pub enum TtlError {
    /// The key does not exist in the primary store.
    #[error("key not found")]
    NotFound,

    /// Reading or writing expiration index entries failed.
    #[error("expiration index I/O failed: {0}")]
    Index(#[source] StoreError),

    /// The primary store rejected a put, delete or batch.
    #[error("primary store I/O failed: {0}")]
    Primary(#[source] StoreError),

    /// The sweep range scan failed.
    #[error("expiry scan failed: {0}")]
    Scan(#[source] StoreError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl TtlError {
    /// Wraps a primary-store error, keeping `NotFound` distinguishable.
    pub fn primary(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => TtlError::NotFound,
            other => TtlError::Primary(other),
        }
    }

    /// Returns true if the key was missing from the primary store.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TtlError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_maps_not_found() {
        assert!(TtlError::primary(StoreError::NotFound).is_not_found());
        assert!(matches!(
            TtlError::primary(StoreError::Closed),
            TtlError::Primary(StoreError::Closed)
        ));
    }

    #[test]
    fn test_display() {
        let err = TtlError::Index(StoreError::Backend("disk full".into()));
        assert_eq!(
            err.to_string(),
            "expiration index I/O failed: backend error: disk full"
        );
    }
}
