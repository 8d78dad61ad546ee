//! Exact-match response cache for chat completions
//!
//! Keyed by a content fingerprint of the normalized request, scoped per
//! user and gateway version. Two backends implement the same contract:
//! an in-process map with TTL eviction and a redis-backed store. Cache
//! faults are best-effort by design; callers treat them as misses.

pub mod key;
pub mod logging;
pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conduit_config::{CacheBackend, CacheConfig};
use thiserror::Error;

pub use key::{ExactCacheKey, build_exact_cache_key};
pub use logging::{CacheMetrics, LoggingExactCache};
pub use memory::MemoryExactCache;
pub use self::redis::RedisExactCache;

/// Cache errors; callers log these and treat them as misses
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backend connection or command failure
    #[error("cache backend: {0}")]
    Backend(String),
    /// Fingerprint or value serialization failure
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Keyed byte storage with TTL
///
/// Keys and values are opaque. `get` never blocks on upstream work and
/// neither operation panics.
#[async_trait]
pub trait ExactCache: Send + Sync {
    /// Look up a value. `Ok(Some)` is a hit, `Ok(None)` a clean miss,
    /// `Err` a backend fault the caller must treat as a miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store a copy of `value` under `key`. A zero TTL is a no-op (the
    /// memory backend deletes instead). Errors are best-effort and are
    /// not retried.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;
}

/// Build the configured cache backend
///
/// # Errors
///
/// Returns an error when the redis backend is selected without a URL or
/// the URL is invalid.
pub fn build_cache(config: &CacheConfig) -> Result<Arc<dyn ExactCache>, CacheError> {
    match config.backend {
        CacheBackend::Memory => {
            let cache: Arc<dyn ExactCache> = MemoryExactCache::new(config.cleanup_interval());
            Ok(cache)
        }
        CacheBackend::Redis => {
            let url = config
                .url
                .as_ref()
                .ok_or_else(|| CacheError::Backend("redis backend requires a url".to_owned()))?;
            let cache = RedisExactCache::new(url.as_str(), config.key_prefix.clone())?;
            Ok(Arc::new(cache))
        }
    }
}
