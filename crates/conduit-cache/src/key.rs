//! Cache key construction and parsing

use std::fmt;

use conduit_llm::ChatRequest;
use sha2::{Digest, Sha256};

use crate::CacheError;

/// Structured exact-cache key
///
/// The string form `exact:<user>:<model>:<version>:<hash>` is part of the
/// external contract; log parsers and the metrics pipeline split it on
/// colons into exactly five fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExactCacheKey {
    /// Cache scope: responses never cross users
    pub user_id: String,
    /// Trimmed model identifier
    pub model_id: String,
    /// Operator-controlled cache-bust handle
    pub version_id: String,
    /// Lowercase hex SHA-256 of the normalized request
    pub hash: String,
}

impl ExactCacheKey {
    /// Split a key string back into its fields
    ///
    /// Returns `None` unless the string has exactly five colon-delimited
    /// fields starting with `exact`.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        let parts: Vec<&str> = key.split(':').collect();
        if parts.len() != 5 || parts[0] != "exact" {
            return None;
        }
        Some(Self {
            user_id: parts[1].to_owned(),
            model_id: parts[2].to_owned(),
            version_id: parts[3].to_owned(),
            hash: parts[4].to_owned(),
        })
    }
}

impl fmt::Display for ExactCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "exact:{}:{}:{}:{}",
            self.user_id, self.model_id, self.version_id, self.hash
        )
    }
}

/// Build an exact-cache key from a request and its scoping
///
/// Normalization is deterministic across processes: trimmed identifiers,
/// the request's canonical JSON serialization (declared field order), and
/// a SHA-256 over `model:<model>|body:<json>`. The JSON encoding is part
/// of the compatibility contract; changing it requires a `version_id`
/// bump since it invalidates every existing entry.
///
/// # Errors
///
/// Returns a serialization error, which callers treat as "cache disabled
/// for this request".
pub fn build_exact_cache_key(
    req: &ChatRequest,
    user_id: &str,
    version_id: &str,
) -> Result<ExactCacheKey, CacheError> {
    let model_id = req.model.trim();
    let body = serde_json::to_vec(req)?;

    let mut hasher = Sha256::new();
    hasher.update(b"model:");
    hasher.update(model_id.as_bytes());
    hasher.update(b"|body:");
    hasher.update(&body);
    let hash = format!("{:x}", hasher.finalize());

    Ok(ExactCacheKey {
        user_id: user_id.trim().to_owned(),
        model_id: model_id.to_owned(),
        version_id: version_id.trim().to_owned(),
        hash,
    })
}
