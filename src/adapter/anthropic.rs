//! Adapter for the Anthropic messages API.
//!
//! Extended-thinking responses carry thinking blocks: the thinking
//! content becomes `reasoning_text`, the text content `raw_text`.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;

use super::{
    AdapterError, AdapterErrorKind, AdapterResponse, Message, ModelAdapter, QueryContext,
    RATE_LIMIT_BACKOFF,
};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Adapter for Anthropic models.
pub struct AnthropicAdapter {
    model_id: String,
    api_key: String,
    temperature: f64,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
    model: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
    thinking: Option<String>,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl AnthropicAdapter {
    /// Create an adapter for one model.
    pub fn new(
        model_id: impl Into<String>,
        api_key: impl Into<String>,
        temperature: f64,
    ) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder().build()?;
        Ok(Self {
            model_id: model_id.into(),
            api_key: api_key.into(),
            temperature,
            client,
        })
    }

    fn call_api(
        &self,
        messages: &[Message],
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<MessagesResponse, AdapterError> {
        let body = json!({
            "model": self.model_id,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": self.temperature,
        });

        for attempt in 0..2 {
            let sent = self
                .client
                .post(API_URL)
                .timeout(timeout)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&body)
                .send();

            let response = match sent {
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

            return response.json::<MessagesResponse>().map_err(|e| {
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

impl ModelAdapter for AnthropicAdapter {
    fn query(
        &self,
        messages: &[Message],
        max_tokens: u32,
        timeout: Duration,
        _context: &QueryContext,
    ) -> Result<AdapterResponse, AdapterError> {
        let start = Instant::now();
        let msg = self.call_api(messages, max_tokens, timeout)?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut raw_text = String::new();
        let mut reasoning_text = None;
        for block in &msg.content {
            match block.kind.as_str() {
                "thinking" => reasoning_text = block.thinking.clone(),
                "text" => raw_text = block.text.clone().unwrap_or_default(),
                _ => {}
            }
        }

        if raw_text.is_empty() && reasoning_text.is_none() {
            return Err(AdapterError::new(
                AdapterErrorKind::EmptyResponse,
                &self.model_id,
                "API returned no content blocks",
            ));
        }

        Ok(AdapterResponse {
            raw_text,
            reasoning_text,
            input_tokens: msg.usage.input_tokens,
            output_tokens: msg.usage.output_tokens,
            latency_ms,
            model_id: self.model_id.clone(),
            model_version: msg.model.unwrap_or_else(|| self.model_id.clone()),
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_body_parses_thinking_and_text() {
        let body = r#"{
            "content": [
                {"type": "thinking", "thinking": "pot odds are bad"},
                {"type": "text", "text": "{\"action\": \"fold\"}"}
            ],
            "usage": {"input_tokens": 120, "output_tokens": 18},
            "model": "claude-sonnet-4-5-20250929"
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.content.len(), 2);
        assert_eq!(parsed.usage.input_tokens, 120);
        assert_eq!(parsed.model.as_deref(), Some("claude-sonnet-4-5-20250929"));
    }

    #[test]
    fn unknown_block_kinds_tolerated() {
        let body = r#"{"content": [{"type": "tool_use"}], "usage": {}}"#;
        let parsed: MessagesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.content[0].kind, "tool_use");
        assert!(parsed.content[0].text.is_none());
    }
}
