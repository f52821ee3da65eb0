//! Background Expiry Sweeper
//!
//! Lookups already hide expired entries, so reclaiming them is purely a
//! memory concern: an entry that expires and is never read again would
//! otherwise stay in its shard forever.
//!
//! The sweeper is a Tokio task that wakes up periodically, calls
//! [`StorageEngine::cleanup_expired`], and adapts its interval: it halves the
//! interval when a large share of the keys turned out to be expired and
//! doubles it when a sweep found nothing.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval used for the first sweep (default: 100ms)
    pub base_interval: Duration,

    /// Lower bound for the adaptive interval (default: 10ms)
    pub min_interval: Duration,

    /// Upper bound for the adaptive interval (default: 1s)
    pub max_interval: Duration,

    /// Sweep faster once more than this fraction of keys were expired
    pub speedup_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,
        }
    }
}

impl ExpiryConfig {
    /// Computes the interval to wait before the next sweep.
    fn next_interval(&self, current: Duration, keys_before: u64, expired: u64) -> Duration {
        if keys_before == 0 || expired == 0 {
            return (current * 2).min(self.max_interval);
        }

        let expiry_rate = expired as f64 / keys_before as f64;
        if expiry_rate > self.speedup_threshold {
            (current / 2).max(self.min_interval)
        } else {
            current
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper on the current Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use redlite::storage::{StorageEngine, ExpirySweeper, ExpiryConfig};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(engine, ExpiryConfig::default());
    ///
    /// // Dropping the handle stops the task
    /// drop(sweeper);
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            base_interval_ms = config.base_interval.as_millis() as u64,
            "Background expiry sweeper started"
        );
        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));

        Self { shutdown_tx }
    }

    /// Stops the expiry sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if self.shutdown_tx.send(true).is_ok() {
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut current_interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(current_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let keys_before = engine.len();
        let expired = engine.cleanup_expired();
        let next = config.next_interval(current_interval, keys_before, expired);

        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = engine.len(),
                "Expired keys cleaned up"
            );
        }
        if next != current_interval {
            trace!(
                new_interval_ms = next.as_millis() as u64,
                "Sweeper interval adjusted"
            );
        }

        current_interval = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RespValue;
    use crate::storage::Expiration;
    use bytes::Bytes;

    #[test]
    fn test_next_interval() {
        let config = ExpiryConfig::default();
        let base = config.base_interval;

        // Nothing expired: back off, capped
        assert_eq!(config.next_interval(base, 10, 0), base * 2);
        assert_eq!(
            config.next_interval(config.max_interval, 10, 0),
            config.max_interval
        );

        // Most keys expired: speed up, floored
        assert_eq!(config.next_interval(base, 10, 5), base / 2);
        assert_eq!(
            config.next_interval(config.min_interval, 10, 5),
            config.min_interval
        );

        // Some keys expired, below threshold: unchanged
        assert_eq!(config.next_interval(base, 100, 1), base);
    }

    #[tokio::test]
    async fn test_sweeper_cleans_expired_keys() {
        let engine = Arc::new(StorageEngine::new());

        for i in 0..10 {
            engine.set(
                Bytes::from(format!("key{}", i)),
                RespValue::bulk_string("value"),
                Expiration::after(Duration::from_millis(50)),
            );
        }
        engine.set(
            Bytes::from("persistent"),
            RespValue::bulk_string("value"),
            Expiration::Never,
        );

        assert_eq!(engine.len(), 11);

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(20),
            ..Default::default()
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);

        tokio::time::sleep(Duration::from_millis(200)).await;

        // Swept without any lookup touching them
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.stats().expired, 10);
        assert_eq!(engine.get(b"persistent"), RespValue::bulk_string("value"));
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let engine = Arc::new(StorageEngine::new());

        let config = ExpiryConfig {
            base_interval: Duration::from_millis(10),
            ..Default::default()
        };

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        engine.set(
            Bytes::from("key"),
            RespValue::bulk_string("value"),
            Expiration::after(Duration::from_millis(10)),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;

        // Still physically present: nothing swept it
        assert_eq!(engine.len(), 1);
        // but logically absent
        assert_eq!(engine.get(b"key"), RespValue::NullBulkString);
    }
}
