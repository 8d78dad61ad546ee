//! Chat orchestrator: the `/v1/chat/completions` handler
//!
//! Translates a client request into a JSON reply, an SSE relay, or a
//! structured error, integrating the exact cache and the upstream client.
//! Non-streaming responses are cached write-through; streams never are.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use conduit_cache::{ExactCache, build_exact_cache_key};
use conduit_llm::{ChatClient, ChatRequest, ChatResponse, LlmError, StreamChunk};
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{ErrorCode, error_response};

/// Shared state for the chat endpoint
#[derive(Clone)]
pub struct ChatState {
    inner: Arc<ChatStateInner>,
}

struct ChatStateInner {
    cache: Arc<dyn ExactCache>,
    llm: Arc<ChatClient>,
    cache_ttl: Duration,
    version_id: String,
}

impl ChatState {
    /// Assemble the handler state
    pub fn new(
        cache: Arc<dyn ExactCache>,
        llm: Arc<ChatClient>,
        cache_ttl: Duration,
        version_id: String,
    ) -> Self {
        Self {
            inner: Arc::new(ChatStateInner {
                cache,
                llm,
                cache_ttl,
                version_id,
            }),
        }
    }
}

/// Handle `POST /v1/chat/completions`
pub(crate) async fn chat_completion(
    State(state): State<ChatState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();

    let req: ChatRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(err) => {
            tracing::warn!(error = %err, "invalid_request");
            return error_response(ErrorCode::InvalidJson);
        }
    };

    // Rejected before any cache work so malformed input never builds a key.
    if let Err(reason) = req.validate() {
        tracing::warn!(reason = %reason, "invalid_request");
        return error_response(ErrorCode::InvalidJson);
    }

    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("anon")
        .to_owned();

    // Logging fallback only; the cache key uses the actual trimmed model.
    let model_id = if req.model.is_empty() {
        "unknown-model".to_owned()
    } else {
        req.model.clone()
    };

    let version_id = if state.inner.version_id.is_empty() {
        "v1".to_owned()
    } else {
        state.inner.version_id.clone()
    };

    let scope = RequestScope {
        user_id,
        model_id,
        version_id,
        started,
    };
    let cancel = CancellationToken::new();

    if req.stream {
        stream_chat_completion(state, cancel, req, scope).await
    } else {
        non_stream_chat_completion(state, cancel, req, scope).await
    }
}

/// Identity and timing context carried through a single request
struct RequestScope {
    user_id: String,
    model_id: String,
    version_id: String,
    started: Instant,
}

async fn non_stream_chat_completion(
    state: ChatState,
    cancel: CancellationToken,
    req: ChatRequest,
    scope: RequestScope,
) -> Response {
    let mut cache_key: Option<String> = None;
    let mut hash_key = String::new();
    let mut cache_lookup_ms = 0.0_f64;

    // A key-builder failure disables the cache for this request only.
    match build_exact_cache_key(&req, &scope.user_id, &scope.version_id) {
        Err(err) => tracing::warn!(error = %err, "key_builder_error"),
        Ok(key) => {
            hash_key = key.hash.clone();
            let key_string = key.to_string();

            let lookup_started = Instant::now();
            let lookup = state.inner.cache.get(&key_string).await;
            cache_lookup_ms = lookup_started.elapsed().as_secs_f64() * 1000.0;

            match lookup {
                Err(err) => tracing::warn!(error = %err, "exact_cache_get_error"),
                Ok(None) => {}
                Ok(Some(bytes)) => match serde_json::from_slice::<ChatResponse>(&bytes) {
                    // Undecodable entries fall through as a miss.
                    Err(err) => tracing::warn!(error = %err, "exact_cache_decode_error"),
                    Ok(cached) => {
                        tracing::info!(
                            cache_tier = "exact",
                            hash_key = %hash_key,
                            user_id = %scope.user_id,
                            model_id = %scope.model_id,
                            version_id = %scope.version_id,
                            cache_hit = true,
                            cache_lookup_ms,
                            total_ms = scope.started.elapsed().as_secs_f64() * 1000.0,
                            "cache_decision"
                        );
                        return Json(cached).into_response();
                    }
                },
            }

            cache_key = Some(key_string);
        }
    }

    let llm_started = Instant::now();
    let response = match state.inner.llm.chat_completion(&cancel, &req).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "llm_request_failed");
            return error_response(ErrorCode::UpstreamError);
        }
    };
    let llm_ms = llm_started.elapsed().as_secs_f64() * 1000.0;

    if let Some(key_string) = &cache_key {
        match serde_json::to_vec(&response) {
            Err(err) => tracing::warn!(error = %err, "encode_response_for_cache_error"),
            Ok(bytes) => {
                if let Err(err) = state
                    .inner
                    .cache
                    .set(key_string, &bytes, state.inner.cache_ttl)
                    .await
                {
                    tracing::warn!(error = %err, "exact_cache_set_error");
                }
            }
        }
    }

    tracing::info!(
        cache_tier = "exact",
        hash_key = %hash_key,
        user_id = %scope.user_id,
        model_id = %scope.model_id,
        version_id = %scope.version_id,
        cache_hit = false,
        cache_lookup_ms,
        llm_ms,
        total_ms = scope.started.elapsed().as_secs_f64() * 1000.0,
        "cache_decision"
    );

    Json(response).into_response()
}

async fn stream_chat_completion(
    state: ChatState,
    cancel: CancellationToken,
    req: ChatRequest,
    scope: RequestScope,
) -> Response {
    let rx = match state.inner.llm.chat_completion_stream(&cancel, &req).await {
        Ok(rx) => rx,
        Err(err) => {
            tracing::error!(error = %err, "llm_stream_connect_failed");
            return error_response(ErrorCode::UpstreamError);
        }
    };

    // Dropping the relay (client disconnect included) cancels the decoder.
    let relay = Relay {
        rx,
        _guard: cancel.drop_guard(),
        phase: RelayPhase::Open,
        chunks: 0,
        completed: false,
        scope,
    };

    let frames = futures_util::stream::unfold(relay, relay_next).map(Ok::<_, Infallible>);
    let sse = Sse::new(frames).keep_alive(KeepAlive::default());

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        sse,
    )
        .into_response()
}

enum RelayPhase {
    /// Forwarding upstream results
    Open,
    /// Error frame written; one `[DONE]` remains
    Draining,
    /// Terminal
    Closed,
}

struct Relay {
    rx: mpsc::Receiver<Result<StreamChunk, LlmError>>,
    _guard: DropGuard,
    phase: RelayPhase,
    chunks: u32,
    completed: bool,
    scope: RequestScope,
}

impl Drop for Relay {
    fn drop(&mut self) {
        if !self.completed {
            tracing::info!(
                user_id = %self.scope.user_id,
                model_id = %self.scope.model_id,
                version_id = %self.scope.version_id,
                chunks = self.chunks,
                total_ms = self.scope.started.elapsed().as_secs_f64() * 1000.0,
                "stream_cancelled"
            );
        }
    }
}

/// Produce the next SSE frame; at most one frame per upstream result
async fn relay_next(mut relay: Relay) -> Option<(Event, Relay)> {
    match relay.phase {
        RelayPhase::Closed => None,
        RelayPhase::Draining => {
            relay.phase = RelayPhase::Closed;
            relay.completed = true;
            Some((done_event(), relay))
        }
        RelayPhase::Open => match relay.rx.recv().await {
            Some(Ok(chunk)) => {
                relay.chunks += 1;
                let event = Event::default().data(chunk_frame_json(&chunk));
                Some((event, relay))
            }
            Some(Err(err)) => {
                tracing::error!(error = %err, "llm_stream_error");
                relay.phase = RelayPhase::Draining;
                Some((error_event(), relay))
            }
            None => {
                relay.phase = RelayPhase::Closed;
                relay.completed = true;
                tracing::info!(
                    user_id = %relay.scope.user_id,
                    model_id = %relay.scope.model_id,
                    version_id = %relay.scope.version_id,
                    chunks = relay.chunks,
                    total_ms = relay.scope.started.elapsed().as_secs_f64() * 1000.0,
                    "stream_completed"
                );
                Some((done_event(), relay))
            }
        },
    }
}

#[derive(Serialize)]
struct StreamFrame {
    choices: Vec<StreamFrameChoice>,
}

#[derive(Serialize)]
struct StreamFrameChoice {
    index: u32,
    delta: StreamFrameDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    finish_reason: Option<String>,
}

#[derive(Serialize)]
struct StreamFrameDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

/// Serialize one relay frame; `content` and `finish_reason` are omitted
/// when empty, the `delta` object itself is always present
fn chunk_frame_json(chunk: &StreamChunk) -> String {
    let frame = StreamFrame {
        choices: vec![StreamFrameChoice {
            index: chunk.index,
            delta: StreamFrameDelta {
                content: if chunk.delta.is_empty() {
                    None
                } else {
                    Some(chunk.delta.clone())
                },
            },
            finish_reason: chunk.finish_reason.clone(),
        }],
    };
    serde_json::to_string(&frame).unwrap_or_default()
}

fn error_event() -> Event {
    Event::default().data(r#"{"error":"upstream_error"}"#)
}

fn done_event() -> Event {
    Event::default().data("[DONE]")
}
