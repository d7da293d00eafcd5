//! Model name normalization for consistent analytics.
//!
//! Maps the model identifiers found across configs, JSONL telemetry
//! and the structured store to canonical display names. Matching is
//! case-insensitive; unknown identifiers pass through unchanged.

use std::collections::HashMap;

use once_cell::sync::Lazy;

// Canonical name → known aliases. The canonical name itself is always
// an implicit alias.
const CANONICAL: &[(&str, &[&str])] = &[
    (
        "claude-opus-4.6",
        &["anthropic/claude-opus-4.6", "opus-4.6", "opus"],
    ),
    (
        "claude-sonnet-4.5",
        &[
            "anthropic/claude-sonnet-4.5",
            "anthropic/claude-sonnet-4-6",
            "sonnet-4.5",
            "sonnet",
            "sonnet-a",
            "claude-sonnet-4-6",
            "sonnet-4-6",
        ],
    ),
    (
        "haiku-3.5",
        &["anthropic/claude-3.5-haiku", "haiku-3.5", "haiku"],
    ),
    (
        "haiku-4.5",
        &[
            "anthropic/claude-haiku-4.5",
            "anthropic/claude-haiku-4-5",
            "haiku-4-5",
        ],
    ),
    ("gpt-5", &["openai/gpt-5"]),
    ("gpt-4o", &["openai/gpt-4o"]),
    ("gpt-4o-mini", &["openai/gpt-4o-mini"]),
    ("o4-mini", &["openai/o4-mini"]),
    ("gemini-2.5-pro", &["google/gemini-2.5-pro"]),
    (
        "gemini-2.5-flash",
        &["google/gemini-2.5-flash", "gemini-flash"],
    ),
    (
        "gemini-2.0-flash",
        &["google/gemini-2.0-flash-001", "google/gemini-2.0-flash"],
    ),
    ("deepseek-r1", &["deepseek/deepseek-r1"]),
    ("deepseek-v3.2", &["deepseek/deepseek-v3.2"]),
    ("deepseek-v3", &["deepseek/deepseek-chat"]),
    ("grok-3", &["x-ai/grok-3"]),
    ("grok-3-mini", &["x-ai/grok-3-mini", "x-ai/grok-3-mini-beta"]),
    ("llama-4-maverick", &["meta-llama/llama-4-maverick"]),
    (
        "llama-4-scout",
        &[
            "meta-llama/llama-4-scout",
            "meta-llama/llama-4-scout-instruct",
            "llama-scout",
        ],
    ),
    (
        "mistral-large-3",
        &["mistralai/mistral-large-2512", "mistral-large", "mistral"],
    ),
    ("mistral-medium-3.1", &["mistralai/mistral-medium-3.1"]),
    (
        "mistral-small",
        &["mistralai/mistral-small-3.1-24b-instruct"],
    ),
    ("nemotron-ultra", &["nvidia/llama-3.1-nemotron-ultra-253b-v1"]),
    ("nova-lite", &["amazon/nova-lite-v1"]),
    ("nova-pro", &["amazon/nova-pro-v1"]),
    ("qwen3-235b", &["qwen/qwen3-235b-a22b"]),
    (
        "qwen3-80b",
        &["qwen/qwen3-next-80b-a3b-instruct", "qwen3-next-80b"],
    ),
    ("sonar", &["perplexity/sonar"]),
    ("palmyra-x5", &["writer/palmyra-x5"]),
    ("glm-4.7", &["thudm/glm-4.7"]),
];

static ALIAS_MAP: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (canonical, aliases) in CANONICAL {
        map.insert(canonical.to_lowercase(), *canonical);
        for alias in *aliases {
            map.insert(alias.to_lowercase(), *canonical);
        }
    }
    map
});

/// Normalize a model identifier to its canonical display name.
///
/// Returns the input unchanged when no mapping exists.
pub fn normalize(model_name: &str) -> String {
    ALIAS_MAP
        .get(&model_name.to_lowercase())
        .map(|s| s.to_string())
        .unwrap_or_else(|| model_name.to_string())
}

/// All known canonical model names, sorted.
pub fn canonical_names() -> Vec<&'static str> {
    let mut names: Vec<&str> = CANONICAL.iter().map(|(c, _)| *c).collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_prefixed_names_normalize() {
        assert_eq!(normalize("anthropic/claude-sonnet-4.5"), "claude-sonnet-4.5");
        assert_eq!(normalize("x-ai/grok-3"), "grok-3");
    }

    #[test]
    fn short_aliases_normalize() {
        assert_eq!(normalize("sonnet"), "claude-sonnet-4.5");
        assert_eq!(normalize("sonnet-a"), "claude-sonnet-4.5");
        assert_eq!(normalize("gemini-flash"), "gemini-2.5-flash");
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(normalize("Sonnet"), "claude-sonnet-4.5");
        assert_eq!(normalize("OPENAI/GPT-4O"), "gpt-4o");
    }

    #[test]
    fn canonical_names_map_to_themselves() {
        for name in canonical_names() {
            assert_eq!(normalize(name), name);
        }
    }

    #[test]
    fn unknown_names_pass_through() {
        assert_eq!(normalize("my-local-model"), "my-local-model");
    }
}
