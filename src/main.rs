//! redlite - A Small RESP Key-Value Server
//!
//! This is the main entry point for the redlite server.
//! It sets up logging, the storage engine and the TCP listener, and hands
//! every accepted connection to its own task.

use clap::Parser;
use redlite::commands::CommandHandler;
use redlite::config::ServerConfig;
use redlite::connection::{handle_connection, ConnectionLimits, ConnectionStats};
use redlite::storage::{ExpirySweeper, StorageEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// A small Redis-compatible key-value server.
///
/// Connect with redis-cli or any Redis client, e.g. `redis-cli -p 6379 PING`.
#[derive(Parser, Debug)]
#[command(name = "redlite", version)]
struct Args {
    /// Host to bind to
    #[arg(long, env = "REDLITE_HOST", default_value = redlite::DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "REDLITE_PORT", default_value_t = redlite::DEFAULT_PORT)]
    port: u16,

    /// Deepest array nesting accepted in a request
    #[arg(long, default_value_t = redlite::protocol::parser::DEFAULT_MAX_DEPTH)]
    max_nesting_depth: usize,

    /// Bytes a client may buffer for one unfinished request
    #[arg(long, default_value_t = redlite::connection::DEFAULT_MAX_BUFFER_SIZE)]
    max_buffer_size: usize,

    /// Initial interval of the background expiry sweep, in milliseconds
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    sweep_interval_ms: u64,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            max_nesting_depth: args.max_nesting_depth,
            max_buffer_size: args.max_buffer_size,
            ..ServerConfig::default()
        }
        .with_sweep_interval(Duration::from_millis(args.sweep_interval_ms))
    }
}

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
redlite v{} - RESP key-value server
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        redlite::VERSION,
        config.bind_address()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from(Args::parse());

    // Set up logging; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner(&config);

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::new());
    info!("Storage engine initialized");

    // Stops when dropped at the end of main
    let _sweeper = ExpirySweeper::start(Arc::clone(&storage), config.expiry.clone());

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(address = %config.bind_address(), "Listening");

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping server..."),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await
            }
        }
    };

    tokio::select! {
        _ = accept_loop(listener, storage, stats, config.connection_limits()) => {}
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
    limits: ConnectionLimits,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = CommandHandler::new(Arc::clone(&storage));
                let stats = Arc::clone(&stats);

                tokio::spawn(handle_connection(stream, addr, handler, stats, limits));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
