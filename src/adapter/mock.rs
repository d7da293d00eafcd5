//! Deterministic offline adapter for tests and dry runs.

use std::time::{Duration, Instant};

use super::{AdapterError, AdapterResponse, Message, ModelAdapter, QueryContext};

/// A pure strategy: given the conversation and match context, produce
/// the raw text a model would have produced.
pub type StrategyFn = dyn Fn(&[Message], &QueryContext) -> String + Send + Sync;

/// Offline adapter driven by a strategy function.
///
/// Output is truncated at `max_tokens × chars_per_token` bytes to
/// imitate a provider-side output cap. The ratio is a heuristic
/// (about 4 characters per token) and configurable.
pub struct MockAdapter {
    model_id: String,
    strategy: Box<StrategyFn>,
    chars_per_token: usize,
}

impl MockAdapter {
    /// Create a mock adapter with the default truncation ratio.
    pub fn new(
        model_id: impl Into<String>,
        strategy: impl Fn(&[Message], &QueryContext) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            strategy: Box::new(strategy),
            chars_per_token: 4,
        }
    }

    /// Override the chars-per-token truncation ratio.
    pub fn with_chars_per_token(mut self, ratio: usize) -> Self {
        self.chars_per_token = ratio.max(1);
        self
    }
}

impl ModelAdapter for MockAdapter {
    fn query(
        &self,
        messages: &[Message],
        max_tokens: u32,
        _timeout: Duration,
        context: &QueryContext,
    ) -> Result<AdapterResponse, AdapterError> {
        let start = Instant::now();
        let mut raw = (self.strategy)(messages, context);

        let max_chars = max_tokens as usize * self.chars_per_token;
        if raw.len() > max_chars {
            // Truncate on a char boundary at or below the byte cap.
            let mut cut = max_chars;
            while !raw.is_char_boundary(cut) {
                cut -= 1;
            }
            raw.truncate(cut);
        }

        let output_tokens = (raw.len() / self.chars_per_token).max(1) as u64;
        Ok(AdapterResponse {
            raw_text: raw,
            reasoning_text: None,
            input_tokens: 0,
            output_tokens,
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            model_id: self.model_id.clone(),
            model_version: self.model_id.clone(),
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
