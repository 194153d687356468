//! # ttlkv - Key Expiration for Ordered Key-Value Stores
//!
//! ttlkv is a time-to-live layer that sits in front of an ordered key-value
//! store. Callers attach a deadline to any key; the layer keeps an
//! expiration index next to the data and a background task deletes keys
//! once their deadline has passed.
//!
//! ## Features
//!
//! - **Any ordered store**: Works over anything implementing [`OrderedStore`]
//! - **Range-scan expiry**: Due keys are found with one ordered range scan,
//!   never a full table walk
//! - **Transparent writes**: `put`, `delete` and `batch` keep the index in
//!   step with the data
//! - **Safe shutdown**: Stopping never interrupts a sweep that is scanning
//! - **Async I/O**: Built on Tokio
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              ttlkv                                      │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────────────┐     │
//! │  │  Command    │───>│  TtlStore   │───>│     OrderedStore         │     │
//! │  │  Handler    │    │ (put/del/   │    │  ┌────────┐ ┌─────────┐  │     │
//! │  │  (binary)   │    │  batch/ttl) │    │  │ user   │ │ !ttl!…  │  │     │
//! │  └─────────────┘    └─────────────┘    │  │ keys   │ │ index   │  │     │
//! │                                        │  └────────┘ └─────────┘  │     │
//! │                                        └──────────────────────────┘     │
//! │                                                     ▲                   │
//! │                                                     │                   │
//! │                     ┌───────────────────────────────┴─────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use ttlkv::{MemoryStore, TtlConfig, TtlStore, WriteOptions};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ttlkv::Result<()> {
//! let config = TtlConfig::default().with_check_frequency(Duration::from_secs(1));
//! let db = TtlStore::open(MemoryStore::new(), config)?;
//!
//! // Expires one minute from now
//! db.put("session", "token123", WriteOptions::with_ttl(Duration::from_secs(60)))
//!     .await?;
//!
//! // Renew without rewriting the value
//! db.ttl("session", Duration::from_secs(120)).await;
//!
//! // Stop the sweeper and close the store
//! db.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`store`]: The ordered store contract and an in-memory implementation
//! - [`ttl`]: Expiration index, coordinator, sweeper and lifecycle
//! - [`commands`]: Line-based command handler used by the binary
//! - [`config`]: Layer configuration
//! - [`error`]: Error types
//!
//! ## Design Highlights
//!
//! ### Best-Effort Index
//!
//! The primary store is authoritative for data. Index writes run alongside
//! the data write and their failures are published as events rather than
//! failing the call.
//!
//! ### Bounded Precision
//!
//! Keys are removed by the sweeper, so a key can outlive its deadline by up
//! to one check interval.

pub mod commands;
pub mod config;
pub mod error;
pub mod store;
pub mod ttl;

// Re-export commonly used types for convenience
pub use commands::{CommandHandler, Reply};
pub use config::TtlConfig;
pub use error::{Result, StoreError, TtlError};
pub use store::{BatchOp, KeyRange, MemoryStore, OrderedStore};
pub use ttl::{SweepPhase, SweepReport, TtlEvent, TtlStats, TtlStore, WriteOptions};

/// Version of ttlkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
