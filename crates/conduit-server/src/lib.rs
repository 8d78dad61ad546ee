//! HTTP server assembly for the conduit gateway
//!
//! Wires the configured cache backend (behind the logging decorator) and
//! the upstream client into the chat orchestrator, and mounts the
//! operational endpoints next to it.

mod chat;
mod error;
mod metrics;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use conduit_cache::{CacheMetrics, ExactCache, LoggingExactCache};
use conduit_config::Config;
use conduit_llm::ChatClient;
use tower_http::trace::TraceLayer;

pub use chat::ChatState;
pub use error::ErrorCode;

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Build the server from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if metrics registration, cache construction, or
    /// upstream client construction fails.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let listen_address = config
            .server
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let registry = prometheus::Registry::new();
        let cache_metrics = CacheMetrics::register(&registry)?;

        let backend = conduit_cache::build_cache(&config.cache)?;
        let cache: Arc<dyn ExactCache> = Arc::new(LoggingExactCache::new(backend, cache_metrics));

        let llm = Arc::new(ChatClient::new(&config.upstream)?);

        let state = ChatState::new(cache, llm, config.cache.ttl(), config.cache.version_id.clone());

        let api = Router::new()
            .route("/v1/chat/completions", axum::routing::post(chat::chat_completion))
            .with_state(state);

        let ops = Router::new()
            .route("/healthz", axum::routing::get(metrics::health_handler))
            .route("/metrics", axum::routing::get(metrics::metrics_handler))
            .with_state(registry);

        let router = api.merge(ops).layer(TraceLayer::new_for_http());

        Ok(Self {
            router,
            listen_address,
        })
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener.
    #[must_use]
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails.
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "gateway listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}
