//! Gateway error vocabulary
//!
//! Every error body has the shape `{"error":"<code>"}`. The codes below
//! are shared with the surrounding middleware stack; `gateway_timeout`
//! is emitted by the timeout layer rather than the handlers here.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Machine-readable error codes returned to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Request body failed to decode or validate
    InvalidJson,
    /// Upstream call failed after retries, or returned an unusable reply
    UpstreamError,
    /// Streaming requested but the response sink cannot flush
    StreamingNotSupported,
    /// Request exceeded the gateway deadline
    GatewayTimeout,
}

impl ErrorCode {
    /// HTTP status paired with this code
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::InvalidJson => StatusCode::BAD_REQUEST,
            Self::UpstreamError => StatusCode::BAD_GATEWAY,
            Self::StreamingNotSupported => StatusCode::INTERNAL_SERVER_ERROR,
            Self::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorCode,
}

/// Render a code as its JSON error response
pub(crate) fn error_response(code: ErrorCode) -> Response {
    (code.status(), Json(ErrorBody { error: code })).into_response()
}
