//! Command Handler Module
//!
//! This module implements the command processing layer of the ttlkv binary.
//! It receives one line of text per command, executes it against a
//! [`TtlStore`](crate::ttl::TtlStore), and returns a [`Reply`].
//!
//! ## Architecture
//!
//! ```text
//! Input line
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    TtlStore     │  (ttl module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PUT`, `GET`, `DEL`, `BATCH`
//! - `TTL`, `PERSIST`, `EXPIRESAT`, `SWEEP`
//! - `PING`, `STATS`, `QUIT`

pub mod handler;

// Re-export the main command handler
pub use handler::{CommandHandler, Reply};
