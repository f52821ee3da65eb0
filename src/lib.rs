//! # redlite - A Small RESP Key-Value Server
//!
//! redlite speaks the Redis Serialization Protocol (RESP2) and serves a
//! handful of commands from a shared in-memory store: `PING`, `ECHO`, `SET`
//! (with optional `PX`/`EX` expiry) and `GET`. Any Redis client can talk to
//! it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              redlite                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │  ┌─────────────────────┐  ┌──────────────────────────────────────────┐  │
//! │  │   RESP parser /     │  │              StorageEngine               │  │
//! │  │   writer            │  │  ┌────────┐ ┌────────┐ ┌────────┐        │  │
//! │  └─────────────────────┘  │  │Shard 0 │ │Shard 1 │ │...64   │        │  │
//! │                           │  └────────┘ └────────┘ └────────┘        │  │
//! │                           └──────────────────────────────────────────┘  │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use redlite::commands::CommandHandler;
//! use redlite::config::ServerConfig;
//! use redlite::connection::{handle_connection, ConnectionStats};
//! use redlite::storage::{ExpirySweeper, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::default();
//!     let storage = Arc::new(StorageEngine::new());
//!     let _sweeper = ExpirySweeper::start(Arc::clone(&storage), config.expiry.clone());
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind(config.bind_address()).await?;
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         let handler = CommandHandler::new(Arc::clone(&storage));
//!         tokio::spawn(handle_connection(
//!             stream,
//!             addr,
//!             handler,
//!             Arc::clone(&stats),
//!             config.connection_limits(),
//!         ));
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP value model, parser and writer
//! - [`storage`]: Thread-safe storage engine with expiry
//! - [`commands`]: Command decoding and execution
//! - [`connection`]: Client connection management
//! - [`config`]: Server configuration
//!
//! ## Expiry
//!
//! An expired key reads as absent the moment its deadline passes. Memory is
//! reclaimed lazily when a `GET` finds the dead entry and actively by a
//! background sweeper, so keys nobody reads again are still freed.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{Command, CommandError, CommandHandler};
pub use config::ServerConfig;
pub use connection::{handle_connection, ConnectionLimits, ConnectionStats};
pub use protocol::{EncodeError, ParseError, RespParser, RespValue};
pub use storage::{Expiration, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port redlite listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host redlite binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of redlite
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
