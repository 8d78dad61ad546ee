//! Configuration for the conduit gateway
//!
//! Loaded from a TOML file with `{{ env.VAR }}` expansion applied to the
//! raw text before deserialization, so structs use plain `String` and
//! `SecretString` fields.

pub mod cache;
mod env;
mod loader;
pub mod server;
pub mod upstream;

use serde::Deserialize;

pub use cache::{CacheBackend, CacheConfig};
pub use server::ServerConfig;
pub use upstream::UpstreamConfig;

/// Top-level gateway configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream LLM provider
    pub upstream: UpstreamConfig,
    /// Exact-match response cache
    #[serde(default)]
    pub cache: CacheConfig,
}
