use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Configuration for the upstream OpenAI-compatible provider
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Provider base URL; `/v1/chat/completions` is appended
    pub base_url: Url,
    /// Bearer token for the provider
    pub api_key: SecretString,
    /// Per-call deadline in seconds; 0 disables the deadline
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retry attempts after the initial one
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff base in milliseconds
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Idle connections kept in the pool
    #[serde(default = "default_pool_idle")]
    pub max_idle_conns: usize,
    /// Idle connections kept per host
    #[serde(default = "default_pool_idle")]
    pub max_idle_conns_per_host: usize,
}

impl UpstreamConfig {
    /// Per-call deadline, `None` when disabled
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }

    /// Backoff base as a duration; zero falls back to the engine default
    #[must_use]
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_base_backoff_ms() -> u64 {
    100
}

const fn default_pool_idle() -> usize {
    100
}
