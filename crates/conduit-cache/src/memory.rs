//! In-process cache backend
//!
//! A map guarded by a reader/writer lock, with lazy expiry on access and
//! an eager background sweeper. Contents are discarded at shutdown.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{CacheError, ExactCache};

/// Sweep interval applied when none is configured
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// Exact cache held entirely in process memory
pub struct MemoryExactCache {
    items: RwLock<HashMap<String, MemoryEntry>>,
    sweeper: CancellationToken,
}

impl MemoryExactCache {
    /// Create the cache and start its background sweeper
    ///
    /// A zero `cleanup_interval` falls back to five minutes. The sweeper
    /// holds only a weak reference, so dropping the last `Arc` also stops
    /// it.
    #[must_use]
    pub fn new(cleanup_interval: Duration) -> Arc<Self> {
        let cleanup_interval = if cleanup_interval.is_zero() {
            DEFAULT_CLEANUP_INTERVAL
        } else {
            cleanup_interval
        };

        let cache = Arc::new(Self {
            items: RwLock::new(HashMap::new()),
            sweeper: CancellationToken::new(),
        });

        let weak = Arc::downgrade(&cache);
        let stop = cache.sweeper.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + cleanup_interval;
            let mut ticker = tokio::time::interval_at(start, cleanup_interval);
            loop {
                tokio::select! {
                    () = stop.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let Some(cache) = weak.upgrade() else { return };
                cache.sweep();
            }
        });

        cache
    }

    /// Stop the background sweeper; safe to call more than once
    pub fn close(&self) {
        self.sweeper.cancel();
    }

    /// Number of entries currently stored, expired ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_items().len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.write_items().clear();
    }

    fn sweep(&self) {
        let now = Instant::now();
        let mut items = self.write_items();
        items.retain(|_, entry| now <= entry.expires_at);
    }

    fn read_items(&self) -> RwLockReadGuard<'_, HashMap<String, MemoryEntry>> {
        self.items.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_items(&self) -> RwLockWriteGuard<'_, HashMap<String, MemoryEntry>> {
        self.items.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for MemoryExactCache {
    fn drop(&mut self) {
        self.sweeper.cancel();
    }
}

#[async_trait]
impl ExactCache for MemoryExactCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let found = {
            let items = self.read_items();
            items.get(key).map(|entry| (entry.value.clone(), entry.expires_at))
        };

        let Some((value, expires_at)) = found else {
            return Ok(None);
        };

        let now = Instant::now();
        if now > expires_at {
            // Re-check under the writer lock; a concurrent set may have
            // refreshed the entry since the read.
            let mut items = self.write_items();
            if let Some(current) = items.get(key) {
                if Instant::now() > current.expires_at {
                    items.remove(key);
                }
            }
            return Ok(None);
        }

        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            self.write_items().remove(key);
            return Ok(());
        }

        let entry = MemoryEntry {
            // Decouple from the caller's buffer.
            value: value.to_vec(),
            expires_at: Instant::now() + ttl,
        };
        self.write_items().insert(key.to_owned(), entry);

        Ok(())
    }
}
