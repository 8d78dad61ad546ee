//! Shared test harness: mock upstream LLM and gateway server wrapper

#![allow(dead_code)]

pub mod mock_llm;
pub mod server;

use conduit_config::Config;

/// Gateway configuration pointed at a mock upstream
///
/// Short backoff keeps retry tests fast; `vtest` scopes cache keys away
/// from any default.
pub fn gateway_config(base_url: &str) -> Config {
    Config::from_toml(&format!(
        r#"
        [upstream]
        base_url = "{base_url}"
        api_key = "test-key"
        timeout_secs = 5
        max_retries = 2
        base_backoff_ms = 10

        [cache]
        backend = "memory"
        ttl_seconds = 60
        version_id = "vtest"
        "#
    ))
    .expect("test config must parse")
}
