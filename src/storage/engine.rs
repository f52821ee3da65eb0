//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the shared key-value store. Every key maps to a
//! [`RespValue`] plus an [`Expiration`] policy.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Keys are hashed onto independent shards, each guarded
//!    by its own `RwLock`, so connections touching different keys rarely
//!    contend.
//! 2. **Logical Expiry**: An entry whose deadline has passed is treated as
//!    absent by every lookup, whether or not it is still in memory.
//! 3. **Reclamation**: Expired entries are removed lazily when a lookup trips
//!    over them and actively by the background sweeper (see `expiry`).
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │            │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │            │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │            │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `set` and a `get` on the same key always land on the same shard, so a
//! reader sees either the old entry or the new one, never a mix.

use crate::protocol::RespValue;
use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// When an entry stops being visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// The entry lives until it is overwritten.
    Never,
    /// The entry is logically absent from this instant on.
    At(Instant),
}

impl Expiration {
    /// Deadline `ttl` from now. A deadline too far out to represent never
    /// arrives.
    pub fn after(ttl: Duration) -> Self {
        Instant::now()
            .checked_add(ttl)
            .map_or(Expiration::Never, Expiration::At)
    }

    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self {
            Expiration::Never => false,
            Expiration::At(deadline) => now >= *deadline,
        }
    }
}

/// A stored value with its expiration policy.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: RespValue,
    pub expiration: Expiration,
}

impl Entry {
    pub fn new(value: RespValue, expiration: Expiration) -> Self {
        Self { value, expiration }
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expiration.is_expired_at(Instant::now())
    }
}

#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

impl Shard {
    // A panic while holding a shard lock cannot leave a map half-written
    // (every mutation is a single insert/remove/retain), so poisoning is
    // ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Snapshot of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Entries physically present, including expired ones not yet reclaimed
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    /// Entries reclaimed after expiring
    pub expired: u64,
}

/// The store shared by every connection.
///
/// Wrap it in an `Arc` and hand a clone to each connection task. All
/// operations take `&self`.
///
/// # Example
///
/// ```
/// use redlite::storage::{Expiration, StorageEngine};
/// use redlite::protocol::RespValue;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), RespValue::bulk_string("Ariz"), Expiration::Never);
/// assert_eq!(engine.get(b"name"), RespValue::bulk_string("Ariz"));
///
/// // Missing keys read as the null bulk string
/// assert_eq!(engine.get(b"missing"), RespValue::NullBulkString);
///
/// engine.set(
///     Bytes::from("session"),
///     RespValue::bulk_string("abc123"),
///     Expiration::after(Duration::from_secs(60)),
/// );
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,

    /// Entries physically present (approximate under concurrency)
    key_count: AtomicU64,

    get_count: AtomicU64,

    set_count: AtomicU64,

    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::default()).collect();

        Self {
            shards,
            key_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Stores `value` under `key`, replacing any previous entry and its
    /// expiration policy.
    ///
    /// # Returns
    ///
    /// Returns `true` if the key was not physically present before.
    pub fn set(&self, key: Bytes, value: RespValue, expiration: Expiration) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.get_shard(&key);
        let mut data = shard.write();

        let is_new = data.insert(key, Entry::new(value, expiration)).is_none();
        if is_new {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }

        is_new
    }

    /// Returns the live value for `key`, or [`RespValue::NullBulkString`] if
    /// the key was never set or has expired.
    ///
    /// An expired entry found here is removed on the spot.
    pub fn get(&self, key: &[u8]) -> RespValue {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.get_shard(key);

        // Fast path: read lock only
        {
            let data = shard.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return entry.value.clone(),
                Some(_) => {}
                None => return RespValue::NullBulkString,
            }
        }

        // Expired: re-check under the write lock, a concurrent set may have
        // replaced the entry in between.
        let mut data = shard.write();
        match data.get(key) {
            Some(entry) if entry.is_expired() => {
                data.remove(key);
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                RespValue::NullBulkString
            }
            Some(entry) => entry.value.clone(),
            None => RespValue::NullBulkString,
        }
    }

    /// Number of entries physically present, including expired entries that
    /// have not been reclaimed yet.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.key_count.load(Ordering::Relaxed),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }

    /// Removes expired entries from all shards.
    ///
    /// This is called by the background expiry sweeper.
    ///
    /// # Returns
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> u64 {
        let now = Instant::now();
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let mut data = shard.write();
            let before = data.len();

            data.retain(|_, entry| !entry.expiration.is_expired_at(now));

            cleaned += (before - data.len()) as u64;
        }

        if cleaned > 0 {
            self.key_count.fetch_sub(cleaned, Ordering::Relaxed);
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }

        cleaned
    }
}
