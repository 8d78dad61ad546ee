use std::time::Duration;

use thiserror::Error;

/// Maximum content size of a single message (512 KiB)
pub const MAX_MESSAGE_SIZE: usize = 512 * 1024;

/// Maximum serialized request size (2 MiB)
pub const MAX_REQUEST_SIZE: usize = 2 * 1024 * 1024;

/// Errors produced by the upstream client
#[derive(Debug, Error)]
pub enum LlmError {
    /// Client construction rejected the configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Request failed the pre-flight invariants
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A single message exceeds the per-message content limit
    #[error("message[{index}] content too large ({size} bytes, max {MAX_MESSAGE_SIZE})")]
    MessageTooLarge {
        /// Position of the offending message
        index: usize,
        /// Observed content size in bytes
        size: usize,
    },

    /// The serialized request exceeds the total payload limit
    #[error("request too large ({size} bytes, max {MAX_REQUEST_SIZE})")]
    RequestTooLarge {
        /// Observed payload size in bytes
        size: usize,
    },

    /// Request body could not be serialized
    #[error("encode request: {0}")]
    Encode(#[from] serde_json::Error),

    /// Network failure that is not worth retrying
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,

    /// The per-call deadline elapsed
    #[error("upstream timeout after {0:?}")]
    Timeout(Duration),

    /// Provider answered with a non-success status
    #[error("upstream {status}: {message}")]
    Upstream {
        /// HTTP status returned by the provider
        status: u16,
        /// Decoded provider error message or truncated raw body
        message: String,
    },

    /// Provider answered 2xx but the body could not be decoded
    #[error("decode upstream response: {0}")]
    Decode(String),

    /// Provider answered 2xx with an empty choice list
    #[error("provider returned no choices")]
    EmptyChoices,

    /// Failure while reading an established stream
    #[error("streaming error: {0}")]
    Streaming(String),

    /// All attempts were consumed without a terminal response
    #[error("max retries ({attempts}) exceeded: {source}")]
    RetriesExhausted {
        /// Total attempts made (initial try included)
        attempts: u32,
        /// Last error observed before giving up
        #[source]
        source: Box<LlmError>,
    },
}
