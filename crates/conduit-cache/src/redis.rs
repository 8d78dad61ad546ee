//! Redis-backed cache backend
//!
//! Same contract as the memory backend over an external store. A missing
//! key maps to a clean miss; every other store error is a backend fault
//! the caller treats as a miss.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::{CacheError, ExactCache};

/// Exact cache backed by a redis-compatible store
pub struct RedisExactCache {
    client: redis::Client,
    prefix: Option<String>,
}

impl RedisExactCache {
    /// Create a redis-backed cache
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a valid redis connection string.
    pub fn new(url: &str, prefix: Option<String>) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::Backend(format!("invalid redis URL: {e}")))?;
        Ok(Self { client, prefix })
    }

    /// Final key sent to the store, with the deployment prefix applied
    fn storage_key(&self, key: &str) -> String {
        match self.prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}:{key}"),
            _ => key.to_owned(),
        }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Backend(format!("connection failed: {e}")))
    }
}

#[async_trait]
impl ExactCache for RedisExactCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection().await?;
        let storage_key = self.storage_key(key);

        // Nil (key does not exist) decodes to None: a clean miss.
        let value: Option<Vec<u8>> = conn
            .get(&storage_key)
            .await
            .map_err(|e| CacheError::Backend(format!("GET failed: {e}")))?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return Ok(());
        }

        let mut conn = self.connection().await?;
        let storage_key = self.storage_key(key);

        let ttl_secs = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(&storage_key, value, ttl_secs)
            .await
            .map_err(|e| CacheError::Backend(format!("SET failed: {e}")))?;

        Ok(())
    }
}
