//! Mock upstream LLM for integration tests
//!
//! Implements a minimal OpenAI-compatible API with canned responses,
//! scripted SSE streams, and failure injection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// Mock upstream that returns predictable responses
pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockLlmState>,
}

struct MockLlmState {
    completion_count: AtomicU32,
    /// Requests left to fail before succeeding
    fail_remaining: AtomicU32,
    /// Status used for injected failures
    fail_status: u16,
    /// `Retry-After` seconds attached to injected failures
    retry_after: Option<u64>,
    /// Assistant content for successful responses
    response_content: String,
    /// Answer 2xx with an empty choice list
    empty_choices: bool,
}

struct MockOptions {
    fail_count: u32,
    fail_status: u16,
    retry_after: Option<u64>,
    response_content: String,
    empty_choices: bool,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            fail_count: 0,
            fail_status: 503,
            retry_after: None,
            response_content: "hello!".to_owned(),
            empty_choices: false,
        }
    }
}

impl MockLlm {
    /// Start a mock that always succeeds with the default content
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(MockOptions::default()).await
    }

    /// Start a mock that fails the first `n` requests with 503
    pub async fn start_failing(n: u32) -> anyhow::Result<Self> {
        Self::start_inner(MockOptions {
            fail_count: n,
            ..MockOptions::default()
        })
        .await
    }

    /// Start a mock that fails the first `n` requests with `status`
    pub async fn start_failing_with_status(n: u32, status: u16) -> anyhow::Result<Self> {
        Self::start_inner(MockOptions {
            fail_count: n,
            fail_status: status,
            ..MockOptions::default()
        })
        .await
    }

    /// Start a mock whose first request gets 429 with a `Retry-After`
    pub async fn start_rate_limited(retry_after_secs: u64) -> anyhow::Result<Self> {
        Self::start_inner(MockOptions {
            fail_count: 1,
            fail_status: 429,
            retry_after: Some(retry_after_secs),
            ..MockOptions::default()
        })
        .await
    }

    /// Start a mock that answers with the given assistant content
    pub async fn start_with_response(content: &str) -> anyhow::Result<Self> {
        Self::start_inner(MockOptions {
            response_content: content.to_owned(),
            ..MockOptions::default()
        })
        .await
    }

    /// Start a mock that answers 2xx with no choices
    pub async fn start_empty_choices() -> anyhow::Result<Self> {
        Self::start_inner(MockOptions {
            empty_choices: true,
            ..MockOptions::default()
        })
        .await
    }

    async fn start_inner(options: MockOptions) -> anyhow::Result<Self> {
        let state = Arc::new(MockLlmState {
            completion_count: AtomicU32::new(0),
            fail_remaining: AtomicU32::new(options.fail_count),
            fail_status: options.fail_status,
            retry_after: options.retry_after,
            response_content: options.response_content,
            empty_choices: options.empty_choices,
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_signal = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_signal.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for configuring the mock as the upstream provider
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of completion requests received, failed attempts included
    pub fn completion_count(&self) -> u32 {
        self.state.completion_count.load(Ordering::SeqCst)
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// -- Wire types matching the OpenAI format --

#[derive(Debug, Deserialize)]
struct ChatCompletionRequest {
    model: String,
    #[allow(dead_code)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[allow(dead_code)]
    role: String,
    #[allow(dead_code)]
    content: Option<String>,
}

async fn handle_chat_completions(
    State(state): State<Arc<MockLlmState>>,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    state.completion_count.fetch_add(1, Ordering::SeqCst);

    let failing = state
        .fail_remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        let status =
            StatusCode::from_u16(state.fail_status).unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
        let body = Json(serde_json::json!({
            "error": {"message": "injected failure", "type": "server_error", "code": null}
        }));

        if let Some(secs) = state.retry_after {
            return (status, [(header::RETRY_AFTER, secs.to_string())], body).into_response();
        }
        return (status, body).into_response();
    }

    if request.stream.unwrap_or(false) {
        return sse_response(&state);
    }

    if state.empty_choices {
        return Json(serde_json::json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": request.model,
            "choices": [],
        }))
        .into_response();
    }

    Json(serde_json::json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": request.model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": state.response_content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
    }))
    .into_response()
}

/// Script a two-delta SSE stream from the configured content
///
/// The first three bytes arrive alone, the remainder carries the finish
/// reason, then the `[DONE]` sentinel.
fn sse_response(state: &MockLlmState) -> Response {
    let content = &state.response_content;
    let split = content.len().min(3);
    let (head, tail) = content.split_at(split);

    let mut body = String::new();
    body.push_str(&format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"index": 0, "delta": {"content": head}}]})
    ));
    if tail.is_empty() {
        body.push_str(&format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]})
        ));
    } else {
        body.push_str(&format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": tail}, "finish_reason": "stop"}]})
        ));
    }
    body.push_str("data: [DONE]\n\n");

    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}
