//! Provider wire format (OpenAI-style), kept separate from the public types

use serde::{Deserialize, Serialize};

use crate::types::ChatMessage;

/// Request body sent to the provider
#[derive(Debug, Serialize)]
pub(crate) struct ProviderChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<&'a [String]>,
    pub stream: bool,
}

/// Choice within a non-streaming provider response
#[derive(Debug, Deserialize)]
pub(crate) struct ProviderChatChoice {
    #[serde(default)]
    pub index: u32,
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProviderUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Non-streaming provider response
#[derive(Debug, Deserialize)]
pub(crate) struct ProviderChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ProviderChatChoice>,
    #[serde(default)]
    pub usage: Option<ProviderUsage>,
}

/// Structured error body some providers return on non-2xx
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProviderErrorResponse {
    #[serde(default)]
    pub error: ProviderErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProviderErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub error_type: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub code: Option<serde_json::Value>,
}

/// One SSE `data:` payload of a streaming response
#[derive(Debug, Deserialize)]
pub(crate) struct ProviderStreamChunk {
    #[serde(default)]
    pub choices: Vec<ProviderStreamChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProviderStreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ProviderStreamDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProviderStreamDelta {
    #[serde(default)]
    #[allow(dead_code)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}
