//! Action extraction and validation from raw model output.
//!
//! Finds every brace-delimited JSON candidate in free-form text,
//! validates each against the event's action schema, and keeps the
//! *last* candidate that passes. Last-wins is deliberate: models that
//! self-correct mid-output ("Wait, let me reconsider...") emit a second
//! JSON object, and the final one is their intended action.

use jsonschema::JSONSchema;
use serde_json::Value;

use crate::sanitizer::detect_injection;

/// A compiled per-event action schema.
pub struct EventSchema {
    compiled: JSONSchema,
}

impl EventSchema {
    /// Compile a JSON Schema document.
    pub fn compile(schema: &Value) -> anyhow::Result<Self> {
        let compiled = JSONSchema::compile(schema)
            .map_err(|e| anyhow::anyhow!("invalid action schema: {e}"))?;
        Ok(Self { compiled })
    }

    fn check(&self, instance: &Value) -> Result<(), String> {
        match self.compiled.validate(instance) {
            Ok(()) => Ok(()),
            Err(mut errors) => {
                let msg = errors
                    .next()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "schema validation failed".to_string());
                Err(format!("Schema validation: {msg}"))
            }
        }
    }
}

/// Result of parsing a model's raw output.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    /// True when a candidate parsed and validated.
    pub success: bool,
    /// The last valid action object.
    pub action: Option<Value>,
    /// The raw text of the winning candidate, or the first candidate on
    /// failure (for diagnostic logging).
    pub raw_json: Option<String>,
    /// Most recent error reason when no candidate survived.
    pub error: Option<String>,
    /// Injection pattern flag. Never blocks parsing.
    pub injection_detected: bool,
}

/// Extract the last valid JSON action from raw text.
pub fn parse(raw_text: &str, schema: &EventSchema) -> ParseOutcome {
    let injection_detected = detect_injection(raw_text);

    let stripped = strip_fences(raw_text);
    let mut candidates = extract_candidates(&stripped);
    if candidates.is_empty() {
        if let Some(recovered) = synthesize_braces(&stripped) {
            candidates.push(recovered);
        }
    }

    if candidates.is_empty() {
        return ParseOutcome {
            success: false,
            action: None,
            raw_json: None,
            error: Some("No JSON object found in output".to_string()),
            injection_detected,
        };
    }

    let mut last_error = None;
    let mut best: Option<(Value, String)> = None;

    for candidate in &candidates {
        let parsed = match parse_with_recovery(candidate) {
            Ok(v) => v,
            Err(e) => {
                last_error = Some(e);
                continue;
            }
        };
        if !parsed.is_object() {
            last_error = Some("JSON value is not an object".to_string());
            continue;
        }
        match schema.check(&parsed) {
            Ok(()) => best = Some((parsed, candidate.clone())),
            Err(e) => last_error = Some(e),
        }
    }

    match best {
        Some((action, raw_json)) => ParseOutcome {
            success: true,
            action: Some(action),
            raw_json: Some(raw_json),
            error: None,
            injection_detected,
        },
        None => ParseOutcome {
            success: false,
            action: None,
            raw_json: candidates.first().cloned(),
            error: last_error,
            injection_detected,
        },
    }
}

/// Parse a candidate, collapsing embedded newlines to spaces on first
/// failure. Models frequently emit literal newlines inside string
/// values, which strict JSON rejects.
fn parse_with_recovery(candidate: &str) -> Result<Value, String> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(v) => Ok(v),
        Err(first) => {
            let collapsed: String = candidate
                .chars()
                .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
                .collect();
            serde_json::from_str::<Value>(&collapsed)
                .map_err(|_| format!("JSON parse error: {first}"))
        }
    }
}

/// Drop markdown fence marker lines (```, ```json, ...).
fn strip_fences(text: &str) -> String {
    if !text.contains("```") {
        return text.to_string();
    }
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collect every outermost brace-delimited span.
fn extract_candidates(text: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        candidates.push(text[start..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }
    candidates
}

/// Recover output that dropped its opening brace: if the text looks like
/// a bare `"key": value` sequence, wrap it in braces.
fn synthesize_braces(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if !trimmed.starts_with('"') {
        return None;
    }
    let after_key = trimmed[1..].find('"').map(|i| &trimmed[i + 2..])?;
    if !after_key.trim_start().starts_with(':') {
        return None;
    }
    let body = trimmed.strip_suffix('}').unwrap_or(trimmed);
    Some(format!("{{{body}}}"))
}
