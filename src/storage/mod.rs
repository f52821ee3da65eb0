//! Storage Engine Module
//!
//! This module provides the shared key-value store: a sharded map from
//! binary-safe keys to [`RespValue`](crate::protocol::RespValue)s with
//! optional expiration, and a background sweeper that reclaims expired
//! entries.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │            │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │            │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use redlite::storage::{Expiration, StorageEngine};
//! use redlite::protocol::RespValue;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine.set(
//!     Bytes::from("session"),
//!     RespValue::bulk_string("token123"),
//!     Expiration::after(Duration::from_secs(3600)),
//! );
//! assert_eq!(engine.get(b"session"), RespValue::bulk_string("token123"));
//! ```

pub mod engine;
pub mod expiry;

// Re-export commonly used types
pub use engine::{Entry, Expiration, StorageEngine, StorageStats};
pub use expiry::{ExpiryConfig, ExpirySweeper};
