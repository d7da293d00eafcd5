//! Tournament configuration: the immutable document every run is built
//! from.
//!
//! Loaded from a YAML file (see [`TournamentConfig::load`]). The order
//! of the `models` mapping is significant: config order *is* seed
//! order, so loading preserves mapping order rather than collecting
//! into a hash map. Per-model compute settings fall back to the global
//! `compute_caps` section.
//!
//! ```yaml
//! tournament: { name: demo, seed: 42, version: "1", format: league }
//! compute_caps: { max_output_tokens: 256, timeout_s: 30.0 }
//! models:
//!   sonnet: { provider: anthropic, model_id: claude-sonnet-4.5, api_key_env: ANTHROPIC_API_KEY }
//!   rock:   { provider: mock, strategy: hold }
//! events:
//!   high_card: { weight: 1, hands_per_match: 20, starting_stack: 100 }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::referee::RefereeConfig;

/// Tournament format selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentFormat {
    /// Seeded single-elimination bracket.
    Bracket,
    /// Round-robin league.
    #[serde(alias = "round_robin")]
    League,
}

/// Language-model service behind a model entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Deterministic offline adapter driven by a named strategy.
    Mock,
    /// Anthropic messages API.
    Anthropic,
    /// OpenAI chat completions API.
    Openai,
    /// Any OpenAI-compatible endpoint (custom base URL).
    Openrouter,
}

/// Global output caps applied to every model unless overridden.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComputeCaps {
    /// Maximum output tokens per query.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_s")]
    pub timeout_s: f64,
}

fn default_max_output_tokens() -> u32 {
    256
}

fn default_timeout_s() -> f64 {
    30.0
}

impl Default for ComputeCaps {
    fn default() -> Self {
        Self {
            max_output_tokens: default_max_output_tokens(),
            timeout_s: default_timeout_s(),
        }
    }
}

/// One competing model and how to reach it.
#[derive(Debug, Clone, Serialize)]
pub struct ModelConfig {
    /// Config key; the display name used everywhere in the tournament.
    pub name: String,
    /// Which adapter implementation serves this model.
    pub provider: Provider,
    /// Provider-side model identifier.
    pub model_id: Option<String>,
    /// Built-in strategy name (mock provider only).
    pub strategy: Option<String>,
    /// Environment variable holding the provider API key.
    pub api_key_env: Option<String>,
    /// Custom API base URL (OpenAI-compatible endpoints).
    pub base_url: Option<String>,
    /// Attribution URL forwarded to OpenRouter-style gateways.
    pub site_url: Option<String>,
    /// Attribution app name forwarded to OpenRouter-style gateways.
    pub app_name: Option<String>,
    /// Sampling temperature.
    pub temperature: f64,
    /// Output cap, resolved against the global compute caps.
    pub max_output_tokens: u32,
    /// Request timeout, resolved against the global compute caps.
    pub timeout_s: f64,
}

/// One event (game) in the tournament.
#[derive(Debug, Clone, Serialize)]
pub struct EventConfig {
    /// Config key; the event name used in match ids.
    pub name: String,
    /// Relative weight of this event in cross-event scoring.
    pub weight: u32,
    /// Hands played per match (chip games).
    pub hands_per_match: u32,
    /// Starting chip stack per player.
    pub starting_stack: u32,
    /// Small and big blind (or ante) sizes.
    pub blinds: (u32, u32),
    /// League fixtures per multi-player event.
    pub rounds: u32,
    /// Games per match (series games).
    pub games_per_match: u32,
    /// Seats per match: 2 for head-to-head events, more for table games.
    pub players_per_match: usize,
}

impl EventConfig {
    /// True when one fixture seats every model at once.
    pub fn is_multiplayer(&self) -> bool {
        self.players_per_match > 2
    }
}

/// The immutable, fully resolved tournament description.
#[derive(Debug, Clone)]
pub struct TournamentConfig {
    /// Unique tournament name (also keys the manifest file).
    pub name: String,
    /// Master seed every match seed derives from.
    pub seed: i64,
    /// Config document version string.
    pub version: String,
    /// Bracket or league.
    pub format: TournamentFormat,
    /// Global output caps.
    pub compute_caps: ComputeCaps,
    /// Escalation thresholds.
    pub referee: RefereeConfig,
    /// Competing models, in seed order.
    pub models: Vec<ModelConfig>,
    /// Events, in config order.
    pub events: Vec<EventConfig>,
    /// Output directory override (`--output`).
    pub output_dir: Option<PathBuf>,
}

#[derive(Deserialize)]
struct RawTournament {
    name: String,
    seed: i64,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default = "default_format")]
    format: TournamentFormat,
}

fn default_version() -> String {
    "1".to_string()
}

fn default_format() -> TournamentFormat {
    TournamentFormat::League
}

#[derive(Deserialize)]
struct RawConfig {
    tournament: RawTournament,
    #[serde(default)]
    compute_caps: ComputeCaps,
    #[serde(default)]
    referee: Option<RefereeConfig>,
    #[serde(default)]
    models: serde_yaml::Mapping,
    #[serde(default)]
    events: serde_yaml::Mapping,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawModel {
    provider: Provider,
    model_id: Option<String>,
    strategy: Option<String>,
    api_key_env: Option<String>,
    base_url: Option<String>,
    site_url: Option<String>,
    app_name: Option<String>,
    #[serde(default)]
    temperature: f64,
    max_output_tokens: Option<u32>,
    timeout_s: Option<f64>,
}

#[derive(Deserialize)]
struct RawEvent {
    weight: u32,
    #[serde(default = "default_hands_per_match")]
    hands_per_match: u32,
    #[serde(default = "default_starting_stack")]
    starting_stack: u32,
    #[serde(default = "default_blinds")]
    blinds: (u32, u32),
    #[serde(default = "default_rounds")]
    rounds: u32,
    #[serde(default = "default_games_per_match")]
    games_per_match: u32,
    #[serde(default = "default_players_per_match")]
    players_per_match: usize,
}

fn default_hands_per_match() -> u32 {
    100
}

fn default_starting_stack() -> u32 {
    200
}

fn default_blinds() -> (u32, u32) {
    (1, 2)
}

fn default_rounds() -> u32 {
    1
}

fn default_games_per_match() -> u32 {
    9
}

fn default_players_per_match() -> usize {
    2
}

impl TournamentConfig {
    /// Load and resolve a tournament config from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parse a tournament config from YAML text.
    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(text).context("malformed YAML")?;

        let mut models = Vec::with_capacity(raw.models.len());
        for (key, value) in &raw.models {
            let name = key
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("model names must be strings"))?;
            let m: RawModel = serde_yaml::from_value(value.clone())
                .with_context(|| format!("invalid model entry '{name}'"))?;
            models.push(ModelConfig {
                name,
                provider: m.provider,
                model_id: m.model_id,
                strategy: m.strategy,
                api_key_env: m.api_key_env,
                base_url: m.base_url,
                site_url: m.site_url,
                app_name: m.app_name,
                temperature: m.temperature,
                max_output_tokens: m
                    .max_output_tokens
                    .unwrap_or(raw.compute_caps.max_output_tokens),
                timeout_s: m.timeout_s.unwrap_or(raw.compute_caps.timeout_s),
            });
        }
        if models.is_empty() {
            bail!("config declares no models");
        }

        let mut events = Vec::with_capacity(raw.events.len());
        for (key, value) in &raw.events {
            let name = key
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("event names must be strings"))?;
            let e: RawEvent = serde_yaml::from_value(value.clone())
                .with_context(|| format!("invalid event entry '{name}'"))?;
            events.push(EventConfig {
                name,
                weight: e.weight,
                hands_per_match: e.hands_per_match,
                starting_stack: e.starting_stack,
                blinds: e.blinds,
                rounds: e.rounds,
                games_per_match: e.games_per_match,
                players_per_match: e.players_per_match,
            });
        }
        if events.is_empty() {
            bail!("config declares no events");
        }

        Ok(Self {
            name: raw.tournament.name,
            seed: raw.tournament.seed,
            version: raw.tournament.version,
            format: raw.tournament.format,
            compute_caps: raw.compute_caps,
            referee: raw.referee.unwrap_or_default(),
            models,
            events,
            output_dir: None,
        })
    }

    /// Model names in seed order.
    pub fn model_names(&self) -> Vec<String> {
        self.models.iter().map(|m| m.name.clone()).collect()
    }

    /// Look up a model by name.
    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Look up an event by name.
    pub fn event(&self, name: &str) -> Option<&EventConfig> {
        self.events.iter().find(|e| e.name == name)
    }
}
