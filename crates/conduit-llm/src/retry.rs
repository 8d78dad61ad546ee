//! Attempt loop shared by the unary and streaming connect paths
//!
//! Retries transient network failures and 429/408/5xx statuses with
//! exponential backoff and full jitter, honoring `Retry-After` when the
//! provider sends one. Context cancellation wins over any sleep.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;

/// Longest wait a `Retry-After` header may impose
const MAX_RETRY_AFTER: Duration = Duration::from_secs(5 * 60);

/// Absolute ceiling for a computed backoff
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Exponent cap: 2^10 is already a 1024x multiplier
const MAX_EXPONENT: u32 = 10;

/// Retry behavior knobs, derived from the upstream configuration
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Additional attempts after the initial one
    pub max_retries: u32,
    /// Backoff base; the attempt-n wait is drawn from `[0, base * 2^n)`
    pub base_backoff: Duration,
}

/// Run `do_once` until it yields a terminal outcome or attempts run out
///
/// A terminal outcome is a 2xx response, a non-retryable status (any 4xx
/// other than 408/429), or a non-transient network error. Retryable
/// responses have their bodies drained before the next attempt so the
/// pooled connection can be reused.
pub(crate) async fn send_with_retry<F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut do_once: F,
) -> Result<reqwest::Response, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let max_attempts = policy.max_retries.saturating_add(1);
    let mut last_err: Option<LlmError> = None;

    for attempt in 0..max_attempts {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        let started = Instant::now();
        let outcome = tokio::select! {
            () = cancel.cancelled() => return Err(LlmError::Cancelled),
            outcome = do_once() => outcome,
        };

        match outcome {
            Err(err) => {
                if !is_transient(&err) {
                    tracing::debug!(error = %err, "non-retryable network error");
                    return Err(LlmError::Transport(err));
                }
                tracing::debug!(
                    attempt = attempt + 1,
                    max_attempts,
                    error = %err,
                    "transient network error, will retry"
                );
                last_err = Some(LlmError::Transport(err));
            }
            Ok(response) => {
                let status = response.status().as_u16();
                tracing::debug!(
                    attempt = attempt + 1,
                    max_attempts,
                    status,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "upstream attempt finished"
                );

                if !should_retry_status(status) {
                    return Ok(response);
                }

                let retry_after = parse_retry_after(response.headers());

                // Drain before retrying so the connection returns to the pool.
                let _ = response.bytes().await;

                last_err = Some(LlmError::Upstream {
                    status,
                    message: "retryable status".to_owned(),
                });

                if let Some(wait) = retry_after {
                    if attempt + 1 < max_attempts {
                        tracing::info!(
                            wait_ms = wait.as_millis() as u64,
                            status,
                            "honoring Retry-After header"
                        );
                        sleep_cancellable(cancel, wait).await?;
                        continue;
                    }
                }
            }
        }

        if attempt + 1 == max_attempts {
            break;
        }

        let backoff = compute_backoff(policy.base_backoff, attempt);
        tracing::debug!(
            backoff_ms = backoff.as_millis() as u64,
            next_attempt = attempt + 2,
            "backing off before retry"
        );
        sleep_cancellable(cancel, backoff).await?;
    }

    tracing::warn!(attempts = max_attempts, "upstream request exhausted all retries");

    let source = last_err.unwrap_or(LlmError::Upstream {
        status: 0,
        message: "unknown upstream error".to_owned(),
    });
    Err(LlmError::RetriesExhausted {
        attempts: max_attempts,
        source: Box::new(source),
    })
}

async fn sleep_cancellable(cancel: &CancellationToken, wait: Duration) -> Result<(), LlmError> {
    tokio::select! {
        () = cancel.cancelled() => Err(LlmError::Cancelled),
        () = tokio::time::sleep(wait) => Ok(()),
    }
}

/// Whether a network error is worth retrying
///
/// Timeouts and connect failures always qualify. Wrapped causes only expose
/// their nature through the message chain, so the chain is scanned for the
/// contract set of transient patterns.
pub(crate) fn is_transient(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_connect() {
        return true;
    }

    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(cause) = current {
        if message_is_transient(&cause.to_string()) {
            return true;
        }
        current = cause.source();
    }
    false
}

/// The transient-message contract; extend only through deliberate change
pub(crate) fn message_is_transient(message: &str) -> bool {
    const TRANSIENT_PATTERNS: [&str; 5] = [
        "connection refused",
        "connection reset",
        "broken pipe",
        "no such host",
        "temporary failure",
    ];

    let lowered = message.to_ascii_lowercase();
    TRANSIENT_PATTERNS.iter().any(|pattern| lowered.contains(pattern))
}

/// Whether an HTTP status should be retried
pub(crate) fn should_retry_status(status: u16) -> bool {
    match status {
        429 | 408 => true,
        500..=599 => true,
        _ => false,
    }
}

/// Extract the wait imposed by a `Retry-After` header
///
/// Accepts integer seconds or an HTTP date. Returns `None` for absent,
/// zero, negative, or unparseable values; the caller falls through to
/// computed backoff. The result is capped at five minutes.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(seconds) = value.parse::<i64>() {
        if seconds <= 0 {
            return None;
        }
        return Some(Duration::from_secs(seconds as u64).min(MAX_RETRY_AFTER));
    }

    let when = DateTime::parse_from_rfc2822(value).ok()?;
    let until = when.signed_duration_since(Utc::now()).to_std().ok()?;
    if until.is_zero() {
        return None;
    }
    Some(until.min(MAX_RETRY_AFTER))
}

/// Exponential backoff with full jitter: uniform over `[0, min(base * 2^n, 60s))`
pub(crate) fn compute_backoff(base: Duration, attempt: u32) -> Duration {
    let base = if base.is_zero() {
        Duration::from_millis(100)
    } else {
        base
    };

    let multiplier = 1u32 << attempt.min(MAX_EXPONENT);
    let capped = base.saturating_mul(multiplier).min(MAX_BACKOFF);
    capped.mul_f64(rand::random::<f64>())
}
