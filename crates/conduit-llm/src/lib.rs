//! Upstream chat-completion client for conduit
//!
//! Wraps a single OpenAI-compatible provider behind a validated, size-guarded
//! client with retries (exponential backoff, full jitter, `Retry-After`) for
//! unary calls and a cancellable SSE decoder for streaming ones.

pub mod client;
pub mod error;
pub mod protocol;
pub mod retry;
pub mod stream;
pub mod types;

pub use client::ChatClient;
pub use error::LlmError;
pub use retry::RetryPolicy;
pub use types::{ChatChoice, ChatMessage, ChatRequest, ChatResponse, Role, StreamChunk, Usage};
