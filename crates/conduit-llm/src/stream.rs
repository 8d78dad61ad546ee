//! Streaming chat-completion client
//!
//! The connection phase runs through the retry engine exactly like the
//! unary path; once bytes have flowed, a failure is terminal for the
//! session. Decoded deltas arrive on a bounded channel fed by a decoder
//! task that owns the HTTP body.

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::ChatClient;
use crate::error::LlmError;
use crate::protocol::ProviderStreamChunk;
use crate::types::{ChatRequest, StreamChunk};

/// Channel capacity decoupling network reads from the consumer's flush
/// cadence; a tuning knob, not a correctness requirement
const STREAM_BUFFER: usize = 16;

impl ChatClient {
    /// Open a streaming chat completion
    ///
    /// On success the returned receiver yields deltas in upstream order
    /// and closes after `[DONE]`, a bare EOF, or a terminal error result.
    /// The stream is single-consumer and not restartable. Cancelling
    /// `cancel` (or dropping the receiver) terminates the decoder task,
    /// which closes the channel and the HTTP body exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid or oversized requests, and for any
    /// connect-phase failure after retries.
    pub async fn chat_completion_stream(
        &self,
        cancel: &CancellationToken,
        req: &ChatRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, LlmError>>, LlmError> {
        let body = self.preflight(req, true)?;

        tracing::debug!(
            model = %req.model,
            message_count = req.messages.len(),
            "chat stream starting"
        );

        let ctx = cancel.child_token();
        let scope = ctx.clone().drop_guard();
        let deadline = self.timeout_deadline();

        let connect = self.dispatch(&ctx, body);
        let response = match deadline {
            Some(at) => match tokio::time::timeout_at(at, connect).await {
                Ok(result) => result?,
                Err(_) => return Err(LlmError::Timeout(self.timeout.unwrap_or_default())),
            },
            None => connect.await?,
        };

        if !response.status().is_success() {
            let err = Self::upstream_error(response).await;
            tracing::error!(model = %req.model, error = %err, "chat stream connect failed");
            return Err(err);
        }

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let model = req.model.clone();

        // The decoder owns the scope from here on and releases it on exit.
        let ctx = scope.disarm();
        tokio::spawn(decode_stream(ctx, deadline, response, tx, model));

        Ok(rx)
    }

    fn timeout_deadline(&self) -> Option<Instant> {
        self.timeout.map(|t| Instant::now() + t)
    }
}

/// Read the SSE body and emit typed deltas until the stream terminates
///
/// Exit paths: cancellation, deadline, `[DONE]`, EOF, read error, decode
/// error, or a dropped receiver. Every one of them drops the sender (the
/// single channel close) and the response body.
async fn decode_stream(
    ctx: CancellationToken,
    deadline: Option<Instant>,
    response: reqwest::Response,
    tx: mpsc::Sender<Result<StreamChunk, LlmError>>,
    model: String,
) {
    let _scope = ctx.clone().drop_guard();

    let expired = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(expired);

    let mut events = Box::pin(response.bytes_stream().eventsource());
    let mut chunks = 0u32;

    loop {
        let event = tokio::select! {
            () = ctx.cancelled() => {
                tracing::info!(model = %model, chunks, "chat stream cancelled");
                return;
            }
            () = &mut expired => {
                tracing::info!(model = %model, chunks, "chat stream deadline reached");
                return;
            }
            event = events.next() => event,
        };

        let event = match event {
            // Upstream may terminate without an explicit [DONE].
            None => {
                tracing::info!(model = %model, chunks, "chat stream completed");
                return;
            }
            Some(Err(err)) => {
                let _ = tx.send(Err(LlmError::Streaming(err.to_string()))).await;
                return;
            }
            Some(Ok(event)) => event,
        };

        let payload = event.data.trim();
        if payload.is_empty() {
            continue;
        }

        if payload == "[DONE]" {
            tracing::info!(model = %model, chunks, "chat stream received [DONE]");
            return;
        }

        let chunk: ProviderStreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(err) => {
                let _ = tx
                    .send(Err(LlmError::Streaming(format!("decode stream chunk: {err}"))))
                    .await;
                return;
            }
        };

        for choice in chunk.choices {
            let delta = choice.delta.content.unwrap_or_default();
            let finish_reason = choice.finish_reason.filter(|reason| !reason.is_empty());
            if delta.is_empty() && finish_reason.is_none() {
                continue;
            }

            let item = StreamChunk {
                index: choice.index,
                delta,
                finish_reason,
            };
            chunks += 1;

            tokio::select! {
                () = ctx.cancelled() => {
                    tracing::info!(model = %model, chunks, "chat stream cancelled while sending chunk");
                    return;
                }
                sent = tx.send(Ok(item)) => {
                    if sent.is_err() {
                        // Consumer dropped the receiver.
                        return;
                    }
                }
            }
        }
    }
}
