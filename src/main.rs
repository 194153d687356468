//! ttlkv - Key Expiration for Ordered Key-Value Stores
//!
//! This is the main entry point for the ttlkv shell.
//! It wraps an in-memory ordered store with the TTL layer and executes
//! commands read line by line from standard input.

use std::time::Duration;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use ttlkv::{CommandHandler, MemoryStore, TtlConfig, TtlEvent, TtlStore};

/// Shell configuration
#[derive(Default)]
struct Config {
    /// Options passed through to the TTL layer
    ttl: TtlConfig,
    /// Suppress the banner and prompt
    quiet: bool,
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--namespace" | "-n" => {
                    config.ttl.namespace = required_value(&args, i, "--namespace").to_string();
                    i += 2;
                }
                "--separator" | "-s" => {
                    config.ttl.separator = required_value(&args, i, "--separator").to_string();
                    i += 2;
                }
                "--check-frequency" | "-f" => {
                    let ms = parse_millis(required_value(&args, i, "--check-frequency"));
                    config.ttl = config.ttl.with_check_frequency(ms);
                    i += 2;
                }
                "--default-ttl" | "-t" => {
                    let ms = parse_millis(required_value(&args, i, "--default-ttl"));
                    config.ttl = config.ttl.with_default_ttl(ms);
                    i += 2;
                }
                "--quiet" | "-q" => {
                    config.quiet = true;
                    i += 1;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("ttlkv version {}", ttlkv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }
}

/// Returns the value following the flag at `i`, or exits.
fn required_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn parse_millis(value: &str) -> Duration {
    let ms = value.parse::<u64>().unwrap_or_else(|_| {
        eprintln!("Error: invalid number of milliseconds: {}", value);
        std::process::exit(1);
    });
    Duration::from_millis(ms)
}

fn print_help() {
    println!(
        r#"
ttlkv - Key Expiration for Ordered Key-Value Stores

USAGE:
    ttlkv [OPTIONS]

OPTIONS:
    -n, --namespace <NAME>         Index namespace (default: ttl)
    -s, --separator <SEP>          Key segment separator (default: !)
    -f, --check-frequency <MS>     Sweep interval in ms (default: 10000)
    -t, --default-ttl <MS>         TTL for writes without one (default: none)
    -q, --quiet                    No banner or prompt
    -v, --version                  Print version information
    -h, --help                     Print this help message

COMMANDS:
    PUT key value [ttl_ms]         EXPIRESAT key
    GET key                        TTL key ms
    DEL key                        PERSIST key
    BATCH [PX ms] PUT k v|DEL k..  SWEEP
    STATS                          PING
    QUIT

EXAMPLE:
    $ ttlkv --check-frequency 500
    ttlkv> PUT session abc 2000
    OK
    ttlkv> GET session
    "abc"
    (3 seconds later)
    ttlkv> GET session
    (nil)
"#
    );
}

fn print_banner(config: &TtlConfig) {
    println!(
        r#"
ttlkv v{} - Key Expiration for Ordered Key-Value Stores
──────────────────────────────────────────────────────────────
Namespace:        {}
Check frequency:  {} ms
Default TTL:      {}

Type QUIT or press Ctrl+C to exit.
"#,
        ttlkv::VERSION,
        config.namespace,
        config.check_frequency.as_millis(),
        config
            .default_ttl
            .map(|ttl| format!("{} ms", ttl.as_millis()))
            .unwrap_or_else(|| "none".to_string()),
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging; RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    if !config.quiet {
        print_banner(&config.ttl);
    }

    // Wrap the store; this also starts the background sweeper
    let db = TtlStore::open(MemoryStore::new(), config.ttl)?;
    let handler = CommandHandler::new(db.clone());

    // Log background failures as they happen
    tokio::spawn(log_events(db.subscribe()));

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping...");
    };

    tokio::select! {
        result = repl(&handler, config.quiet) => result?,
        _ = shutdown => {}
    }

    db.close().await?;
    info!("Shutdown complete");
    Ok(())
}

/// Reads commands from stdin until EOF or QUIT
async fn repl(handler: &CommandHandler<MemoryStore>, quiet: bool) -> anyhow::Result<()> {
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();

    loop {
        if !quiet {
            stdout.write_all(b"ttlkv> ").await?;
            stdout.flush().await?;
        }

        let Some(line) = lines.next_line().await? else {
            debug!("End of input");
            return Ok(());
        };

        if let Some(reply) = handler.execute(&line).await {
            stdout.write_all(format!("{}\n", reply).as_bytes()).await?;
        }

        if line.trim().eq_ignore_ascii_case("QUIT") {
            return Ok(());
        }
    }
}

/// Logs events published by the TTL layer
async fn log_events(mut events: tokio::sync::broadcast::Receiver<TtlEvent>) {
    loop {
        match events.recv().await {
            Ok(TtlEvent::SweepCompleted(report)) if report.expired > 0 => {
                info!(expired = report.expired, "Sweep removed expired keys");
            }
            Ok(TtlEvent::SweepCompleted(_)) => {}
            Ok(TtlEvent::Error(_)) => {
                // Already logged where it was raised
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event listener fell behind");
            }
            Err(RecvError::Closed) => return,
        }
    }
}
