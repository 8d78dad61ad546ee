//! Unary chat-completion client

use std::time::Duration;

use chrono::DateTime;
use conduit_config::UpstreamConfig;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;

use crate::error::{LlmError, MAX_MESSAGE_SIZE, MAX_REQUEST_SIZE};
use crate::protocol::{ProviderChatRequest, ProviderChatResponse, ProviderErrorResponse};
use crate::retry::{self, RetryPolicy};
use crate::types::{ChatChoice, ChatRequest, ChatResponse, Usage};

/// Client for a single OpenAI-compatible upstream provider
///
/// Cheap to share behind an `Arc`; the inner `reqwest::Client` pools
/// connections across requests.
pub struct ChatClient {
    http: reqwest::Client,
    completions_url: String,
    api_key: SecretString,
    pub(crate) timeout: Option<Duration>,
    policy: RetryPolicy,
}

impl ChatClient {
    /// Build a client from the upstream configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Config` when the API key is empty or the HTTP
    /// client cannot be constructed.
    pub fn new(config: &UpstreamConfig) -> Result<Self, LlmError> {
        if config.api_key.expose_secret().trim().is_empty() {
            return Err(LlmError::Config("api_key is required".to_owned()));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(config.max_idle_conns_per_host)
            .build()
            .map_err(|e| LlmError::Config(format!("build http client: {e}")))?;

        let base = config.base_url.as_str().trim_end_matches('/');

        Ok(Self {
            http,
            completions_url: format!("{base}/v1/chat/completions"),
            api_key: config.api_key.clone(),
            timeout: config.timeout(),
            policy: RetryPolicy {
                max_retries: config.max_retries,
                base_backoff: config.base_backoff(),
            },
        })
    }

    /// Execute a non-streaming chat completion
    ///
    /// Validates and size-checks the request, then submits it through the
    /// retry engine under the configured per-call deadline. The derived
    /// cancellation scope is released on every exit path.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid or oversized requests, exhausted
    /// retries, non-success statuses, undecodable bodies, or an empty
    /// choice list.
    pub async fn chat_completion(
        &self,
        cancel: &CancellationToken,
        req: &ChatRequest,
    ) -> Result<ChatResponse, LlmError> {
        let started = std::time::Instant::now();
        let body = self.preflight(req, false)?;

        tracing::debug!(
            model = %req.model,
            message_count = req.messages.len(),
            "chat completion starting"
        );

        let ctx = cancel.child_token();
        let _scope = ctx.clone().drop_guard();

        let result = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.complete_once(&ctx, body)).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(timeout)),
            },
            None => self.complete_once(&ctx, body).await,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(response) => tracing::info!(
                model = %response.model,
                prompt_tokens = response.usage.prompt_tokens,
                completion_tokens = response.usage.completion_tokens,
                duration_ms,
                "chat completion finished"
            ),
            Err(err) => tracing::error!(error = %err, duration_ms, "chat completion failed"),
        }

        result
    }

    async fn complete_once(
        &self,
        ctx: &CancellationToken,
        body: Vec<u8>,
    ) -> Result<ChatResponse, LlmError> {
        let response = self.dispatch(ctx, body).await?;

        if !response.status().is_success() {
            return Err(Self::upstream_error(response).await);
        }

        let provider: ProviderChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        if provider.choices.is_empty() {
            return Err(LlmError::EmptyChoices);
        }

        let usage = provider.usage.unwrap_or_default();

        Ok(ChatResponse {
            id: provider.id,
            created: DateTime::from_timestamp(provider.created, 0).unwrap_or_default(),
            model: provider.model,
            choices: provider
                .choices
                .into_iter()
                .map(|choice| ChatChoice {
                    index: choice.index,
                    message: choice.message,
                    finish_reason: choice.finish_reason,
                })
                .collect(),
            usage: Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
        })
    }

    /// Validate the request and produce the provider-shaped payload
    pub(crate) fn preflight(&self, req: &ChatRequest, stream: bool) -> Result<Vec<u8>, LlmError> {
        req.validate().map_err(LlmError::InvalidRequest)?;

        for (index, message) in req.messages.iter().enumerate() {
            if message.content.len() > MAX_MESSAGE_SIZE {
                return Err(LlmError::MessageTooLarge {
                    index,
                    size: message.content.len(),
                });
            }
        }

        let body = serde_json::to_vec(&ProviderChatRequest {
            model: &req.model,
            messages: &req.messages,
            temperature: req.temperature,
            top_p: req.top_p,
            max_tokens: req.max_tokens,
            stop: req.stop.as_deref(),
            stream,
        })?;

        if body.len() > MAX_REQUEST_SIZE {
            return Err(LlmError::RequestTooLarge { size: body.len() });
        }

        Ok(body)
    }

    /// Submit through the retry engine, building a fresh request per attempt
    pub(crate) async fn dispatch(
        &self,
        ctx: &CancellationToken,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, LlmError> {
        retry::send_with_retry(&self.policy, ctx, || {
            self.http
                .post(&self.completions_url)
                .bearer_auth(self.api_key.expose_secret())
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone())
                .send()
        })
        .await
    }

    /// Map a non-success response to an error, preferring the provider's
    /// structured error body over the raw bytes
    pub(crate) async fn upstream_error(response: reqwest::Response) -> LlmError {
        let status = response.status().as_u16();
        let body = response.bytes().await.unwrap_or_default();

        if let Ok(provider_err) = serde_json::from_slice::<ProviderErrorResponse>(&body) {
            if !provider_err.error.message.is_empty() {
                return LlmError::Upstream {
                    status,
                    message: format!(
                        "{} ({})",
                        provider_err.error.message, provider_err.error.error_type
                    ),
                };
            }
        }

        LlmError::Upstream {
            status,
            message: truncate_body(&body, 200),
        }
    }
}

/// Render at most `max` raw bytes of a body for error messages
fn truncate_body(body: &[u8], max: usize) -> String {
    if body.len() <= max {
        String::from_utf8_lossy(body).into_owned()
    } else {
        format!("{}...", String::from_utf8_lossy(&body[..max]))
    }
}
