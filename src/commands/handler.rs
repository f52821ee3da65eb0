//! Command Handler
//!
//! Takes one decoded request, turns it into a [`Command`], runs it against
//! the storage engine and produces exactly one reply.
//!
//! ## Supported Commands
//!
//! - `PING` - Replies `PONG`
//! - `ECHO message` - Replies with `message` as a bulk string
//! - `SET key value [PX milliseconds | EX seconds]` - Set a key
//! - `GET key` - Get a key's value, or nil
//!
//! Every validation failure becomes a simple error reply; nothing here can
//! fail the connection.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │  try_from() │───>│  dispatch() │───>│  cmd_*()    │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      StorageEngine          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::commands::command::Command;
use crate::protocol::RespValue;
use crate::storage::{Expiration, StorageEngine};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Executes commands against a shared storage engine.
///
/// Cloning is cheap; every connection gets its own clone.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Executes a request and returns the reply.
    ///
    /// # Arguments
    ///
    /// * `request` - The parsed RESP value (should be an array of bulk strings)
    pub fn execute(&self, request: RespValue) -> RespValue {
        match Command::try_from(request) {
            Ok(command) => self.dispatch(command),
            Err(e) => {
                debug!(error = %e, "Rejected command");
                RespValue::error(e.to_string())
            }
        }
    }

    /// Runs an already validated command.
    pub fn dispatch(&self, command: Command) -> RespValue {
        trace!(command = command.name(), "Dispatching command");

        match command {
            Command::Ping => self.cmd_ping(),
            Command::Echo { message } => self.cmd_echo(message),
            Command::Set { key, value, ttl } => self.cmd_set(key, value, ttl),
            Command::Get { key } => self.cmd_get(&key),
        }
    }

    fn cmd_ping(&self) -> RespValue {
        RespValue::pong()
    }

    fn cmd_echo(&self, message: Bytes) -> RespValue {
        RespValue::bulk_string(message)
    }

    /// SET key value [PX milliseconds | EX seconds]
    fn cmd_set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> RespValue {
        let expiration = ttl.map_or(Expiration::Never, Expiration::after);
        self.storage
            .set(key, RespValue::BulkString(value), expiration);
        RespValue::ok()
    }

    fn cmd_get(&self, key: &[u8]) -> RespValue {
        self.storage.get(key)
    }
}
