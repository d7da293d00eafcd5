//! Uniform request/response interface to language-model services.
//!
//! Every provider hides behind the [`ModelAdapter`] trait. Adapters
//! never let provider-specific errors escape: all failures surface as
//! an [`AdapterError`] with a small closed set of kinds, which the
//! referee pipeline maps to violations. Rate limits get exactly one
//! blocking backoff retry inside the adapter before surfacing.

mod anthropic;
mod mock;
mod openai;

pub use anthropic::AnthropicAdapter;
pub use mock::{MockAdapter, StrategyFn};
pub use openai::OpenAiAdapter;

use std::time::Duration;

use serde::Serialize;

/// Wait applied between the first rate-limited attempt and its retry.
pub(crate) const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(5);

/// Failure categories an adapter can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorKind {
    /// The request did not complete within the per-request timeout.
    Timeout,
    /// The provider rejected the request for quota reasons, twice.
    RateLimit,
    /// Any other provider-side failure.
    ApiError,
    /// The provider returned no usable content.
    EmptyResponse,
}

impl AdapterErrorKind {
    /// Stable string form used in violation details.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterErrorKind::Timeout => "timeout",
            AdapterErrorKind::RateLimit => "rate_limit",
            AdapterErrorKind::ApiError => "api_error",
            AdapterErrorKind::EmptyResponse => "empty_response",
        }
    }
}

impl std::fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single error type adapters raise.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} from {model_id}: {details}")]
pub struct AdapterError {
    /// What went wrong.
    pub kind: AdapterErrorKind,
    /// The model the query was addressed to.
    pub model_id: String,
    /// Provider-reported detail text.
    pub details: String,
}

impl AdapterError {
    /// Build an error for the given model and kind.
    pub fn new(kind: AdapterErrorKind, model_id: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            kind,
            model_id: model_id.into(),
            details: details.into(),
        }
    }
}

/// One chat message in a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// "user", "assistant" or "system".
    pub role: String,
    /// Message text.
    pub content: String,
}

impl Message {
    /// A user-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// A system-role message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Immutable record of one model query.
#[derive(Debug, Clone)]
pub struct AdapterResponse {
    /// The answer text.
    pub raw_text: String,
    /// Extracted reasoning/thinking text, when the provider reports it.
    pub reasoning_text: Option<String>,
    /// Prompt tokens billed.
    pub input_tokens: u64,
    /// Completion tokens billed.
    pub output_tokens: u64,
    /// Wall-clock latency of the query.
    pub latency_ms: f64,
    /// The model the query was addressed to.
    pub model_id: String,
    /// The model version the provider reports having served.
    pub model_version: String,
}

/// Match-side context passed with every query.
///
/// Live adapters ignore it; mock strategies use it to key deterministic
/// behavior off the match state.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    /// Match identifier.
    pub match_id: String,
    /// The player slot being prompted.
    pub player_id: String,
    /// Event name.
    pub event: String,
    /// Turn counter at the time of the query.
    pub turn_number: u64,
}

/// A language-model service.
///
/// Implementations must be shareable across match threads; the
/// underlying clients must be thread-safe.
pub trait ModelAdapter: Send + Sync {
    /// Send messages to the model and return its response.
    fn query(
        &self,
        messages: &[Message],
        max_tokens: u32,
        timeout: Duration,
        context: &QueryContext,
    ) -> Result<AdapterResponse, AdapterError>;

    /// The model identifier this adapter serves.
    fn model_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_strings_are_stable() {
        assert_eq!(AdapterErrorKind::Timeout.as_str(), "timeout");
        assert_eq!(AdapterErrorKind::RateLimit.as_str(), "rate_limit");
        assert_eq!(AdapterErrorKind::ApiError.as_str(), "api_error");
        assert_eq!(AdapterErrorKind::EmptyResponse.as_str(), "empty_response");
    }

    #[test]
    fn error_display_carries_model_and_details() {
        let e = AdapterError::new(AdapterErrorKind::Timeout, "m1", "deadline exceeded");
        assert_eq!(e.to_string(), "timeout from m1: deadline exceeded");
    }
}
