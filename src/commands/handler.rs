//! Command Handler Module
//!
//! This module implements the text commands understood by the ttlkv binary.
//! Each input line is split on whitespace and dispatched to a handler that
//! runs it against a [`TtlStore`].
//!
//! ## Supported Commands
//!
//! ### Data Commands
//! - `PUT key value [ttl_ms]` - Write a key, optionally expiring
//! - `GET key` - Read a key
//! - `DEL key` - Delete a key and its expiry
//! - `BATCH [PX ttl_ms] PUT key value | DEL key ...` - Atomic batch
//!
//! ### Expiry Commands
//! - `TTL key ms` - Set or renew a key's TTL
//! - `PERSIST key` - Remove a key's TTL
//! - `EXPIRESAT key` - Tracked expiry in Unix milliseconds
//! - `SWEEP` - Run a sweep now
//!
//! ### Server Commands
//! - `PING [message]` - Test the handler
//! - `STATS` - TTL layer statistics
//! - `QUIT` - Accepted; the caller ends the session
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │   split()   │───>│  dispatch() │───>│  execute()  │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                           TtlStore          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::error::TtlError;
use crate::store::{BatchOp, OrderedStore};
use crate::ttl::{TtlStore, WriteOptions};
use bytes::Bytes;
use std::fmt;
use std::time::Duration;

/// A reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Command succeeded with nothing to return.
    Ok,
    /// A status word such as `PONG`.
    Status(String),
    /// A stored value.
    Value(Bytes),
    /// A number.
    Integer(i64),
    /// No such key, or no expiry.
    Nil,
    /// Multiple lines, such as statistics.
    Lines(Vec<String>),
    /// The command failed.
    Error(String),
}

impl Reply {
    /// Creates an error reply.
    pub fn error(msg: impl Into<String>) -> Self {
        Reply::Error(msg.into())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Value(v) => write!(f, "\"{}\"", String::from_utf8_lossy(v)),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Lines(lines) => write!(f, "{}", lines.join("\n")),
            Reply::Error(e) => write!(f, "(error) {}", e),
        }
    }
}

/// Handles text commands by dispatching them to a [`TtlStore`].
pub struct CommandHandler<S: OrderedStore> {
    /// The TTL-wrapped store
    db: TtlStore<S>,
}

impl<S: OrderedStore> Clone for CommandHandler<S> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}

impl<S: OrderedStore> CommandHandler<S> {
    /// Creates a new command handler over `db`.
    pub fn new(db: TtlStore<S>) -> Self {
        Self { db }
    }

    /// Executes one input line and returns the reply.
    ///
    /// Empty lines produce `None`.
    pub async fn execute(&self, line: &str) -> Option<Reply> {
        let mut parts = line.split_whitespace();
        let cmd = parts.next()?.to_uppercase();
        let args: Vec<&str> = parts.collect();

        Some(self.dispatch(&cmd, &args).await)
    }

    /// Dispatches a command to its handler.
    async fn dispatch(&self, cmd: &str, args: &[&str]) -> Reply {
        match cmd {
            // Data commands
            "PUT" | "SET" => self.cmd_put(args).await,
            "GET" => self.cmd_get(args).await,
            "DEL" => self.cmd_del(args).await,
            "BATCH" => self.cmd_batch(args).await,

            // Expiry commands
            "TTL" | "PEXPIRE" => self.cmd_ttl(args).await,
            "PERSIST" => self.cmd_persist(args).await,
            "EXPIRESAT" => self.cmd_expiresat(args).await,
            "SWEEP" => self.cmd_sweep(args).await,

            // Server commands
            "PING" => self.cmd_ping(args),
            "STATS" => self.cmd_stats(args),
            "QUIT" => Reply::Ok,

            // Unknown command
            _ => Reply::error(format!("ERR unknown command '{}'", cmd)),
        }
    }

    // ========================================================================
    // Helper functions
    // ========================================================================

    /// Parses a millisecond count.
    fn parse_millis(arg: &str) -> Option<Duration> {
        arg.parse::<u64>().ok().map(Duration::from_millis)
    }

    fn wrong_args(cmd: &str) -> Reply {
        Reply::error(format!(
            "ERR wrong number of arguments for '{}' command",
            cmd
        ))
    }

    fn store_error(err: TtlError) -> Reply {
        Reply::error(format!("ERR {}", err))
    }

    // ========================================================================
    // Data Commands
    // ========================================================================

    /// PUT key value [ttl_ms]
    async fn cmd_put(&self, args: &[&str]) -> Reply {
        let options = match args {
            [_, _] => WriteOptions::default(),
            [_, _, ttl] => match Self::parse_millis(ttl) {
                Some(ttl) => WriteOptions::with_ttl(ttl),
                None => return Reply::error("ERR invalid expire time"),
            },
            _ => return Self::wrong_args("PUT"),
        };

        let key = Bytes::from(args[0].to_string());
        let value = Bytes::from(args[1].to_string());
        match self.db.put(key, value, options).await {
            Ok(()) => Reply::Ok,
            Err(e) => Self::store_error(e),
        }
    }

    /// GET key
    async fn cmd_get(&self, args: &[&str]) -> Reply {
        let [key] = args else {
            return Self::wrong_args("GET");
        };

        match self.db.get(key).await {
            Ok(value) => Reply::Value(value),
            Err(TtlError::NotFound) => Reply::Nil,
            Err(e) => Self::store_error(e),
        }
    }

    /// DEL key
    async fn cmd_del(&self, args: &[&str]) -> Reply {
        let [key] = args else {
            return Self::wrong_args("DEL");
        };

        match self.db.delete(key.to_string()).await {
            Ok(()) => Reply::Ok,
            Err(e) => Self::store_error(e),
        }
    }

    /// BATCH [PX ttl_ms] PUT key value | DEL key ...
    async fn cmd_batch(&self, args: &[&str]) -> Reply {
        let mut options = WriteOptions::default();
        let mut ops = Vec::new();

        let mut i = 0;
        while i < args.len() {
            match args[i].to_uppercase().as_str() {
                "PX" if i + 1 < args.len() => {
                    match Self::parse_millis(args[i + 1]) {
                        Some(ttl) => options = WriteOptions::with_ttl(ttl),
                        None => return Reply::error("ERR invalid expire time"),
                    }
                    i += 2;
                }
                "PUT" if i + 2 < args.len() => {
                    ops.push(BatchOp::put(args[i + 1].to_string(), args[i + 2].to_string()));
                    i += 3;
                }
                "DEL" if i + 1 < args.len() => {
                    ops.push(BatchOp::delete(args[i + 1].to_string()));
                    i += 2;
                }
                _ => return Reply::error("ERR syntax error"),
            }
        }

        if ops.is_empty() {
            return Self::wrong_args("BATCH");
        }

        let count = ops.len() as i64;
        match self.db.batch(ops, options).await {
            Ok(()) => Reply::Integer(count),
            Err(e) => Self::store_error(e),
        }
    }

    // ========================================================================
    // Expiry Commands
    // ========================================================================

    /// TTL key ms
    async fn cmd_ttl(&self, args: &[&str]) -> Reply {
        let [key, ttl] = args else {
            return Self::wrong_args("TTL");
        };

        match Self::parse_millis(ttl) {
            Some(ttl) if !ttl.is_zero() => {
                self.db.ttl(key.to_string(), ttl).await;
                Reply::Ok
            }
            _ => Reply::error("ERR invalid expire time"),
        }
    }

    /// PERSIST key
    async fn cmd_persist(&self, args: &[&str]) -> Reply {
        let [key] = args else {
            return Self::wrong_args("PERSIST");
        };

        self.db.clear_ttl(key.to_string()).await;
        Reply::Ok
    }

    /// EXPIRESAT key
    async fn cmd_expiresat(&self, args: &[&str]) -> Reply {
        let [key] = args else {
            return Self::wrong_args("EXPIRESAT");
        };

        match self.db.expires_at(key).await {
            Ok(Some(at)) => Reply::Integer(at as i64),
            Ok(None) => Reply::Nil,
            Err(e) => Self::store_error(e),
        }
    }

    /// SWEEP
    async fn cmd_sweep(&self, args: &[&str]) -> Reply {
        if !args.is_empty() {
            return Self::wrong_args("SWEEP");
        }

        match self.db.sweep().await {
            Some(report) => Reply::Integer(report.expired as i64),
            None => Reply::error("ERR sweeper busy or stopped"),
        }
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[&str]) -> Reply {
        match args {
            [] => Reply::Status("PONG".to_string()),
            _ => Reply::Status(args.join(" ")),
        }
    }

    /// STATS
    fn cmd_stats(&self, _args: &[&str]) -> Reply {
        let stats = self.db.stats();
        Reply::Lines(vec![
            format!("keys_tracked:{}", stats.keys_tracked),
            format!("keys_cleared:{}", stats.keys_cleared),
            format!("keys_expired:{}", stats.keys_expired),
            format!("sweeps:{}", stats.sweeps),
            format!("sweeps_abandoned:{}", stats.sweeps_abandoned),
            format!("index_errors:{}", stats.index_errors),
            format!("data_errors:{}", stats.data_errors),
            format!("scan_errors:{}", stats.scan_errors),
            format!("phase:{:?}", self.db.phase()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TtlConfig;
    use crate::store::MemoryStore;

    fn create_handler() -> CommandHandler<MemoryStore> {
        let config = TtlConfig::default().with_check_frequency(Duration::from_secs(3600));
        CommandHandler::new(TtlStore::open(MemoryStore::new(), config).unwrap())
    }

    async fn run(handler: &CommandHandler<MemoryStore>, line: &str) -> Reply {
        handler.execute(line).await.unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let handler = create_handler();

        assert_eq!(run(&handler, "PING").await, Reply::Status("PONG".into()));
        assert_eq!(run(&handler, "ping hello").await, Reply::Status("hello".into()));
    }

    #[tokio::test]
    async fn test_empty_line() {
        let handler = create_handler();
        assert_eq!(handler.execute("   ").await, None);
    }

    #[tokio::test]
    async fn test_put_get_del() {
        let handler = create_handler();

        assert_eq!(run(&handler, "PUT name Ariz").await, Reply::Ok);
        assert_eq!(
            run(&handler, "GET name").await,
            Reply::Value(Bytes::from("Ariz"))
        );
        assert_eq!(run(&handler, "DEL name").await, Reply::Ok);
        assert_eq!(run(&handler, "GET name").await, Reply::Nil);
    }

    #[tokio::test]
    async fn test_put_with_ttl_and_persist() {
        let handler = create_handler();

        assert_eq!(run(&handler, "PUT session abc 60000").await, Reply::Ok);
        assert!(matches!(
            run(&handler, "EXPIRESAT session").await,
            Reply::Integer(_)
        ));

        assert_eq!(run(&handler, "PERSIST session").await, Reply::Ok);
        assert_eq!(run(&handler, "EXPIRESAT session").await, Reply::Nil);
    }

    #[tokio::test]
    async fn test_ttl_then_sweep() {
        let handler = create_handler();

        run(&handler, "PUT key value").await;
        assert_eq!(run(&handler, "TTL key 1").await, Reply::Ok);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(run(&handler, "SWEEP").await, Reply::Integer(1));
        assert_eq!(run(&handler, "GET key").await, Reply::Nil);
    }

    #[tokio::test]
    async fn test_batch() {
        let handler = create_handler();

        run(&handler, "PUT old v").await;
        assert_eq!(
            run(&handler, "BATCH PX 60000 PUT a 1 PUT b 2 DEL old").await,
            Reply::Integer(3)
        );
        assert_eq!(run(&handler, "GET old").await, Reply::Nil);
        assert!(matches!(run(&handler, "EXPIRESAT b").await, Reply::Integer(_)));

        assert!(matches!(
            run(&handler, "BATCH PUT a").await,
            Reply::Error(_)
        ));
    }

    #[tokio::test]
    async fn test_argument_errors() {
        let handler = create_handler();

        assert!(matches!(run(&handler, "GET").await, Reply::Error(_)));
        assert!(matches!(run(&handler, "PUT k").await, Reply::Error(_)));
        assert!(matches!(run(&handler, "PUT k v soon").await, Reply::Error(_)));
        assert!(matches!(run(&handler, "TTL k 0").await, Reply::Error(_)));
    }

    #[tokio::test]
    async fn test_stats() {
        let handler = create_handler();

        run(&handler, "PUT k v 1000").await;
        match run(&handler, "STATS").await {
            Reply::Lines(lines) => assert!(lines.contains(&"keys_tracked:1".to_string())),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let handler = create_handler();

        assert!(matches!(run(&handler, "UNKNOWN").await, Reply::Error(_)));
    }

    #[test]
    fn test_reply_display() {
        assert_eq!(Reply::Ok.to_string(), "OK");
        assert_eq!(Reply::Integer(3).to_string(), "(integer) 3");
        assert_eq!(Reply::Value(Bytes::from("v")).to_string(), "\"v\"");
        assert_eq!(Reply::Nil.to_string(), "(nil)");
    }
}
