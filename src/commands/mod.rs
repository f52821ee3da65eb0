//! Command Handler Module
//!
//! This module implements the command processing layer. It receives parsed
//! RESP requests, validates them into typed commands, executes them against
//! the storage engine, and returns the reply.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Command      │  validate + decode once
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  execute
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```

pub mod command;
pub mod handler;

pub use command::{Command, CommandError};
pub use handler::CommandHandler;
