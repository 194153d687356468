//! TTL Layer Module
//!
//! This module turns any [`OrderedStore`](crate::store::OrderedStore) into a
//! store with key expiration. It is split along the four moving parts of the
//! layer:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       TtlStore                              │
//! │              (coordinator: put/delete/batch/ttl)            │
//! └───────────────┬─────────────────────────────┬───────────────┘
//!                 │                             │
//!                 ▼                             ▼
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │     ExpirationIndex       │   │      ExpirySweeper        │
//! │  forward: key -> expiry   │◄──│  (Background Tokio Task)  │
//! │  reverse: expiry|key      │   │  scan due -> delete       │
//! └───────────────────────────┘   └─────────────┬─────────────┘
//!                                               │
//!                                 ┌─────────────▼─────────────┐
//!                                 │        Lifecycle          │
//!                                 │ Idle/Scanning/Applying/   │
//!                                 │ Stopped + deferred stop   │
//!                                 └───────────────────────────┘
//! ```
//!
//! Background failures never reach callers; they are published on the
//! [`EventBus`] and counted in [`TtlStats`].

pub mod coordinator;
pub mod events;
pub mod index;
pub mod lifecycle;
pub mod stats;
pub mod sweeper;

// Re-export commonly used types
pub use coordinator::{TtlStore, WriteOptions};
pub use events::{EventBus, TtlEvent};
pub use index::{duration_ms, now_ms, ExpirationIndex, ExpiredEntry, KeyCodec};
pub use lifecycle::{Lifecycle, SweepPhase};
pub use stats::TtlStats;
pub use sweeper::{ExpirySweeper, SweepReport};
