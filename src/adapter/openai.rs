//! Adapter for OpenAI-compatible chat APIs.
//!
//! Works against the OpenAI API and any compatible endpoint (gateway
//! routers, local servers) via a base-URL override. Reasoning models
//! take `max_completion_tokens` instead of `max_tokens` and only
//! support the default temperature; the substitution is applied
//! automatically from the model id.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    AdapterError, AdapterErrorKind, AdapterResponse, Message, ModelAdapter, QueryContext,
    RATE_LIMIT_BACKOFF,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REASONING_PREFIXES: [&str; 4] = ["gpt-5", "o1", "o3", "o4"];

/// Adapter for OpenAI-compatible APIs.
pub struct OpenAiAdapter {
    model_id: String,
    api_key: String,
    base_url: String,
    temperature: f64,
    extra_headers: Vec<(String, String)>,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
    model: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    reasoning_content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl OpenAiAdapter {
    /// Create an adapter for one model against the default OpenAI URL.
    pub fn new(
        model_id: impl Into<String>,
        api_key: impl Into<String>,
        temperature: f64,
    ) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder().build()?;
        Ok(Self {
            model_id: model_id.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature,
            extra_headers: Vec::new(),
            client,
        })
    }

    /// Point the adapter at a compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attach attribution or routing headers sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// True when the model takes reasoning-model request parameters.
    fn is_reasoning_model(&self) -> bool {
        let name = self.model_id.rsplit('/').next().unwrap_or(&self.model_id);
        REASONING_PREFIXES.iter().any(|p| name.starts_with(p))
    }

    fn request_body(&self, messages: &[Message], max_tokens: u32) -> Value {
        let token_param = if self.is_reasoning_model() {
            "max_completion_tokens"
        } else {
            "max_tokens"
        };
        let mut body = json!({
            "model": self.model_id,
            "messages": messages,
            token_param: max_tokens,
        });
        if !self.is_reasoning_model() {
            body["temperature"] = json!(self.temperature);
        }
        body
    }

    fn call_api(
        &self,
        messages: &[Message],
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<ChatResponse, AdapterError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = self.request_body(messages, max_tokens);

        for attempt in 0..2 {
            let mut request = self
                .client
                .post(&url)
                .timeout(timeout)
                .bearer_auth(&self.api_key)
                .json(&body);
            for (name, value) in &self.extra_headers {
                request = request.header(name, value);
            }

            let response = match request.send() {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    return Err(AdapterError::new(
                        AdapterErrorKind::Timeout,
                        &self.model_id,
                        e.to_string(),
                    ))
                }
                Err(e) => {
                    return Err(AdapterError::new(
                        AdapterErrorKind::ApiError,
                        &self.model_id,
                        e.to_string(),
                    ))
                }
            };

            let status = response.status();
            if status.as_u16() == 429 {
                if attempt == 0 {
                    std::thread::sleep(RATE_LIMIT_BACKOFF);
                    continue;
                }
                let detail = response.text().unwrap_or_default();
                return Err(AdapterError::new(
                    AdapterErrorKind::RateLimit,
                    &self.model_id,
                    detail,
                ));
            }
            if !status.is_success() {
                let detail = response.text().unwrap_or_default();
                return Err(AdapterError::new(
                    AdapterErrorKind::ApiError,
                    &self.model_id,
                    format!("HTTP {status}: {detail}"),
                ));
            }

            return response.json::<ChatResponse>().map_err(|e| {
                AdapterError::new(AdapterErrorKind::ApiError, &self.model_id, e.to_string())
            });
        }

        Err(AdapterError::new(
            AdapterErrorKind::ApiError,
            &self.model_id,
            "max retries exceeded",
        ))
    }
}

impl ModelAdapter for OpenAiAdapter {
    fn query(
        &self,
        messages: &[Message],
        max_tokens: u32,
        timeout: Duration,
        _context: &QueryContext,
    ) -> Result<AdapterResponse, AdapterError> {
        let start = Instant::now();
        let completion = self.call_api(messages, max_tokens, timeout)?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let choice = completion.choices.into_iter().next().ok_or_else(|| {
            AdapterError::new(
                AdapterErrorKind::EmptyResponse,
                &self.model_id,
                "API returned no choices",
            )
        })?;

        let (input_tokens, output_tokens) = completion
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(AdapterResponse {
            raw_text: choice.message.content.unwrap_or_default(),
            reasoning_text: choice.message.reasoning_content,
            input_tokens,
            output_tokens,
            latency_ms,
            model_id: self.model_id.clone(),
            model_version: completion.model.unwrap_or_else(|| self.model_id.clone()),
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
