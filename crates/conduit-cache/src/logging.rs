//! Logging and metrics decorator
//!
//! Wraps any [`ExactCache`] without changing its shape, timing each
//! operation, logging the outcome with the parsed key fields, and
//! counting hits, misses, and faults.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use prometheus::IntCounter;

use crate::key::ExactCacheKey;
use crate::{CacheError, ExactCache};

/// Counters for exact-cache outcomes, registered at startup and passed in
/// at construction
#[derive(Clone)]
pub struct CacheMetrics {
    hits: IntCounter,
    misses: IntCounter,
    errors: IntCounter,
}

impl CacheMetrics {
    /// Create the counters and register them with `registry`
    ///
    /// # Errors
    ///
    /// Returns an error if a counter with the same name is already
    /// registered.
    pub fn register(registry: &prometheus::Registry) -> Result<Self, prometheus::Error> {
        let hits = IntCounter::new("conduit_exact_cache_hits_total", "Exact cache hits")?;
        let misses = IntCounter::new("conduit_exact_cache_misses_total", "Exact cache misses")?;
        let errors = IntCounter::new("conduit_exact_cache_errors_total", "Exact cache backend faults")?;

        registry.register(Box::new(hits.clone()))?;
        registry.register(Box::new(misses.clone()))?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self { hits, misses, errors })
    }

    /// Counters attached to a throwaway registry, for tests and embedding
    #[must_use]
    pub fn unregistered() -> Self {
        Self {
            hits: IntCounter::new("conduit_exact_cache_hits_total", "Exact cache hits")
                .expect("valid counter definition"),
            misses: IntCounter::new("conduit_exact_cache_misses_total", "Exact cache misses")
                .expect("valid counter definition"),
            errors: IntCounter::new("conduit_exact_cache_errors_total", "Exact cache backend faults")
                .expect("valid counter definition"),
        }
    }

    /// Current hit count
    #[must_use]
    pub fn hit_count(&self) -> u64 {
        self.hits.get()
    }

    /// Current miss count
    #[must_use]
    pub fn miss_count(&self) -> u64 {
        self.misses.get()
    }
}

/// Cache decorator that logs and records metrics for every operation
pub struct LoggingExactCache {
    inner: Arc<dyn ExactCache>,
    metrics: CacheMetrics,
}

impl LoggingExactCache {
    /// Wrap `inner` with logging and the given metrics handles
    pub fn new(inner: Arc<dyn ExactCache>, metrics: CacheMetrics) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl ExactCache for LoggingExactCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let started = Instant::now();
        let result = self.inner.get(key).await;
        let latency_ms = latency_ms(started.elapsed());

        let parts = ExactCacheKey::parse(key);
        let user_id = parts.as_ref().map_or("", |p| p.user_id.as_str());
        let model_id = parts.as_ref().map_or("", |p| p.model_id.as_str());
        let version_id = parts.as_ref().map_or("", |p| p.version_id.as_str());

        match &result {
            Err(err) => {
                self.metrics.errors.inc();
                tracing::error!(
                    cache_tier = "exact",
                    hash_key = key,
                    cache_result = "error",
                    latency_ms,
                    user_id,
                    model_id,
                    version_id,
                    error = %err,
                    "exact_cache_get"
                );
            }
            Ok(Some(_)) => {
                self.metrics.hits.inc();
                tracing::info!(
                    cache_tier = "exact",
                    hash_key = key,
                    cache_result = "hit",
                    latency_ms,
                    user_id,
                    model_id,
                    version_id,
                    "exact_cache_get"
                );
            }
            Ok(None) => {
                self.metrics.misses.inc();
                tracing::info!(
                    cache_tier = "exact",
                    hash_key = key,
                    cache_result = "miss",
                    latency_ms,
                    user_id,
                    model_id,
                    version_id,
                    "exact_cache_get"
                );
            }
        }

        result
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let started = Instant::now();
        let result = self.inner.set(key, value, ttl).await;
        let latency_ms = latency_ms(started.elapsed());

        let parts = ExactCacheKey::parse(key);
        let user_id = parts.as_ref().map_or("", |p| p.user_id.as_str());
        let model_id = parts.as_ref().map_or("", |p| p.model_id.as_str());
        let version_id = parts.as_ref().map_or("", |p| p.version_id.as_str());

        match &result {
            Err(err) => tracing::error!(
                cache_tier = "exact",
                hash_key = key,
                latency_ms,
                user_id,
                model_id,
                version_id,
                error = %err,
                "exact_cache_set"
            ),
            Ok(()) => tracing::info!(
                cache_tier = "exact",
                hash_key = key,
                latency_ms,
                user_id,
                model_id,
                version_id,
                "exact_cache_set"
            ),
        }

        result
    }
}

fn latency_ms(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}
