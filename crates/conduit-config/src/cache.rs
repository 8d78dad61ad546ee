use std::time::Duration;

use serde::Deserialize;
use url::Url;

/// Exact-cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Storage backend for cached responses
    #[serde(default)]
    pub backend: CacheBackend,
    /// Connection URL, required for the redis backend
    #[serde(default)]
    pub url: Option<Url>,
    /// Time-to-live for cached responses in seconds
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Deployment prefix prepended to keys sent to the external store
    #[serde(default)]
    pub key_prefix: Option<String>,
    /// Sweep interval for the memory backend; falls back to the TTL
    #[serde(default)]
    pub cleanup_interval_secs: Option<u64>,
    /// Operator-controlled cache-bust handle included in every key
    #[serde(default = "default_version_id")]
    pub version_id: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            url: None,
            ttl_seconds: default_ttl_seconds(),
            key_prefix: None,
            cleanup_interval_secs: None,
            version_id: default_version_id(),
        }
    }
}

impl CacheConfig {
    /// Response TTL as a duration
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Sweep interval for the memory backend, defaulting to the TTL
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval_secs
            .map_or_else(|| self.ttl(), Duration::from_secs)
    }
}

/// Supported cache backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// In-process map with TTL eviction, discarded at shutdown
    #[default]
    Memory,
    /// External key-value store
    Redis,
}

fn default_ttl_seconds() -> u64 {
    300
}

fn default_version_id() -> String {
    "v1".to_owned()
}
