//! Tournament engine: adapter factory, seed management and the match
//! entry point shared by both orchestrators.
//!
//! Construction resolves every model to an adapter (failing fast on
//! missing API keys), derives the telemetry directory, and connects
//! the optional telemetry sink. The sink is closed when the engine
//! drops, so it is flushed on every exit path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use rand::Rng;
use serde_json::json;
use tracing::info;

use crate::adapter::{
    AnthropicAdapter, Message, MockAdapter, ModelAdapter, OpenAiAdapter, QueryContext,
};
use crate::configuration::{EventConfig, ModelConfig, Provider, TournamentConfig};
use crate::game_interface::GameEngineFactory;
use crate::match_runner::{run_match, MatchResult, MatchSettings, QueryCaps};
use crate::seed::SeedManager;
use crate::sink::TelemetrySink;
use crate::telemetry::{TelemetryLogger, TournamentContext};

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Output directory used when the config carries no override.
pub const DEFAULT_OUTPUT_DIR: &str = "output/runs";

/// Owns the shared pieces of a tournament run.
///
/// Thread-safe: orchestrators share one engine across match worker
/// threads. Game engines themselves are constructed per match through
/// the factory, so each match owns its state exclusively.
pub struct TournamentEngine {
    config: TournamentConfig,
    seed_manager: SeedManager,
    adapters: HashMap<String, Arc<dyn ModelAdapter>>,
    factory: Arc<dyn GameEngineFactory>,
    telemetry_dir: PathBuf,
    sink: TelemetrySink,
}

impl TournamentEngine {
    /// Build the engine: resolve adapters from the config, create the
    /// telemetry dir, connect the sink.
    pub fn new(
        config: TournamentConfig,
        factory: Arc<dyn GameEngineFactory>,
    ) -> anyhow::Result<Self> {
        let mut adapters: HashMap<String, Arc<dyn ModelAdapter>> = HashMap::new();
        for model in &config.models {
            adapters.insert(model.name.clone(), build_adapter(model)?);
        }
        Self::with_adapters(config, factory, adapters)
    }

    /// Build the engine with explicit adapters instead of the config
    /// factory. Every model must be covered.
    pub fn with_adapters(
        config: TournamentConfig,
        factory: Arc<dyn GameEngineFactory>,
        adapters: HashMap<String, Arc<dyn ModelAdapter>>,
    ) -> anyhow::Result<Self> {
        for model in &config.models {
            if !adapters.contains_key(&model.name) {
                bail!("no adapter provided for model {}", model.name);
            }
        }

        let output_dir = config
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        let telemetry_dir = output_dir.join("telemetry");
        std::fs::create_dir_all(&telemetry_dir)
            .with_context(|| format!("could not create {}", telemetry_dir.display()))?;

        let sink = TelemetrySink::from_env(false);
        sink.handle().register_tournament(
            &config.name,
            json!({
                "name": config.name,
                "seed": config.seed,
                "version": config.version,
                "format": config.format,
                "models": config.model_names(),
                "events": config.events.iter().map(|e| e.name.clone()).collect::<Vec<_>>(),
            }),
        );

        info!(tournament = %config.name, "tournament engine ready");
        Ok(Self {
            seed_manager: SeedManager::new(config.seed),
            config,
            adapters,
            factory,
            telemetry_dir,
            sink,
        })
    }

    /// The resolved tournament configuration.
    pub fn config(&self) -> &TournamentConfig {
        &self.config
    }

    /// Directory holding per-match JSONL logs and the manifest.
    pub fn telemetry_dir(&self) -> &Path {
        &self.telemetry_dir
    }

    /// The determinism layer.
    pub fn seed_manager(&self) -> SeedManager {
        self.seed_manager
    }

    /// Deterministic 6-hex match-id suffix for a match slot.
    ///
    /// Derived from the match seed, so identical configs produce
    /// identical match ids run over run.
    pub fn match_suffix(&self, event: &str, round: u32, match_number: u32) -> String {
        let seed = self.seed_manager.match_seed(event, round, match_number);
        let mut rng = self.seed_manager.rng(seed);
        format!("{:06x}", rng.gen::<u32>() & 0xff_ffff)
    }

    /// Run one match to completion.
    ///
    /// `models` seats the listed models in slot order. The match seed
    /// derives from `(event, round, match_number)`.
    pub fn run_match(
        &self,
        event: &EventConfig,
        models: &[String],
        match_id: &str,
        round: u32,
        match_number: u32,
    ) -> anyhow::Result<MatchResult> {
        let engine = self
            .factory
            .new_engine(event, models.len())
            .with_context(|| format!("could not build engine for event {}", event.name))?;
        let player_ids = engine.player_ids();
        if player_ids.len() != models.len() {
            bail!(
                "event {} seats {} players but {} models were given",
                event.name,
                player_ids.len(),
                models.len()
            );
        }

        let mut player_models = HashMap::new();
        let mut adapters = HashMap::new();
        let mut caps = HashMap::new();
        for (player_id, model_name) in player_ids.iter().zip(models) {
            let model_cfg = self
                .config
                .model(model_name)
                .with_context(|| format!("unknown model {model_name}"))?;
            let adapter = self
                .adapters
                .get(model_name)
                .with_context(|| format!("no adapter for model {model_name}"))?;
            player_models.insert(player_id.clone(), model_name.clone());
            adapters.insert(player_id.clone(), adapter.clone());
            caps.insert(
                player_id.clone(),
                QueryCaps {
                    max_output_tokens: model_cfg.max_output_tokens,
                    timeout: Duration::from_secs_f64(model_cfg.timeout_s),
                },
            );
        }

        let context = TournamentContext {
            tournament_name: self.config.name.clone(),
            event_type: event.name.clone(),
            tier: String::new(), // the sink infers it from the name
            round,
        };
        let logger = TelemetryLogger::new(
            &self.telemetry_dir,
            match_id,
            Some(self.sink.handle()),
            context,
        )?;

        let settings = MatchSettings {
            match_id: match_id.to_string(),
            event: event.name.clone(),
            seed: self.seed_manager.match_seed(&event.name, round, match_number),
            player_models,
            adapters,
            caps,
            referee_config: self.config.referee.clone(),
        };
        run_match(settings, engine, logger)
    }

    /// Flush and close the telemetry sink. Also happens on drop.
    pub fn close(&mut self) {
        self.sink.close();
    }
}

/// Build the adapter for one model entry, switching on the provider
/// tag. Missing API keys fail here, before any match starts.
fn build_adapter(model: &ModelConfig) -> anyhow::Result<Arc<dyn ModelAdapter>> {
    match model.provider {
        Provider::Mock => {
            let strategy_name = model.strategy.as_deref().unwrap_or("hold");
            let strategy = builtin_strategy(strategy_name).with_context(|| {
                format!("model {} uses unknown strategy {strategy_name}", model.name)
            })?;
            Ok(Arc::new(MockAdapter::new(model.name.clone(), strategy)))
        }
        Provider::Anthropic => {
            let (model_id, api_key) = live_credentials(model)?;
            Ok(Arc::new(AnthropicAdapter::new(
                model_id,
                api_key,
                model.temperature,
            )?))
        }
        Provider::Openai => {
            let (model_id, api_key) = live_credentials(model)?;
            let mut adapter = OpenAiAdapter::new(model_id, api_key, model.temperature)?;
            if let Some(base_url) = &model.base_url {
                adapter = adapter.with_base_url(base_url);
            }
            Ok(Arc::new(adapter))
        }
        Provider::Openrouter => {
            let (model_id, api_key) = live_credentials(model)?;
            let base_url = model.base_url.as_deref().unwrap_or(OPENROUTER_BASE_URL);
            let mut adapter =
                OpenAiAdapter::new(model_id, api_key, model.temperature)?.with_base_url(base_url);
            if let Some(site_url) = &model.site_url {
                adapter = adapter.with_header("HTTP-Referer", site_url);
            }
            if let Some(app_name) = &model.app_name {
                adapter = adapter.with_header("X-Title", app_name);
            }
            Ok(Arc::new(adapter))
        }
    }
}

fn live_credentials(model: &ModelConfig) -> anyhow::Result<(String, String)> {
    let model_id = model
        .model_id
        .clone()
        .with_context(|| format!("model {} declares no model_id", model.name))?;
    let key_env = model
        .api_key_env
        .as_ref()
        .with_context(|| format!("model {} declares no api_key_env", model.name))?;
    let api_key = std::env::var(key_env)
        .with_context(|| format!("environment variable {key_env} is not set"))?;
    Ok((model_id, api_key))
}

/// Built-in mock strategies, keyed by the `strategy` config field.
fn builtin_strategy(
    name: &str,
) -> anyhow::Result<impl Fn(&[Message], &QueryContext) -> String + Send + Sync + 'static> {
    let kind = match name {
        "hold" | "fold" | "self_correct" | "garbage" | "alternate" => name.to_string(),
        _ => bail!("no built-in strategy named {name}"),
    };
    Ok(move |_messages: &[Message], context: &QueryContext| match kind.as_str() {
        "hold" => r#"{"action": "hold"}"#.to_string(),
        "fold" => r#"{"action": "fold"}"#.to_string(),
        "self_correct" => {
            "{\"action\": \"hold\"}\n\nWait, let me reconsider.\n\n{\"action\": \"fold\"}"
                .to_string()
        }
        "garbage" => "I would rather not commit to an action.".to_string(),
        "alternate" => {
            if context.turn_number % 2 == 0 {
                r#"{"action": "fold"}"#.to_string()
            } else {
                r#"{"action": "hold"}"#.to_string()
            }
        }
        _ => unreachable!("strategy names are validated at construction"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn mock_model(name: &str, strategy: Option<&str>) -> ModelConfig {
        ModelConfig {
            name: name.to_string(),
            provider: Provider::Mock,
            model_id: None,
            strategy: strategy.map(str::to_string),
            api_key_env: None,
            base_url: None,
            site_url: None,
            app_name: None,
            temperature: 0.0,
            max_output_tokens: 64,
            timeout_s: 5.0,
        }
    }

    #[test]
    fn mock_adapter_built_from_strategy_name() {
        let adapter = build_adapter(&mock_model("m", Some("fold"))).unwrap();
        let resp = adapter
            .query(
                &[Message::user("x")],
                64,
                Duration::from_secs(1),
                &QueryContext::default(),
            )
            .unwrap();
        assert_eq!(resp.raw_text, r#"{"action": "fold"}"#);
    }

    #[test]
    fn default_mock_strategy_is_hold() {
        let adapter = build_adapter(&mock_model("m", None)).unwrap();
        let resp = adapter
            .query(&[], 64, Duration::from_secs(1), &QueryContext::default())
            .unwrap();
        assert_eq!(resp.raw_text, r#"{"action": "hold"}"#);
    }

    #[test]
    fn unknown_strategy_rejected() {
        assert!(build_adapter(&mock_model("m", Some("wat"))).is_err());
    }

    #[test]
    fn self_correct_emits_two_objects_last_fold() {
        let adapter = build_adapter(&mock_model("m", Some("self_correct"))).unwrap();
        let resp = adapter
            .query(&[], 64, Duration::from_secs(1), &QueryContext::default())
            .unwrap();
        assert!(resp.raw_text.contains("reconsider"));
        assert!(resp.raw_text.trim_end().ends_with(r#"{"action": "fold"}"#));
    }

    #[test]
    fn live_provider_without_key_env_fails() {
        let mut model = mock_model("m", None);
        model.provider = Provider::Anthropic;
        model.model_id = Some("claude-sonnet-4.5".to_string());
        model.api_key_env = None;
        assert!(build_adapter(&model).is_err());
    }

    #[test]
    fn live_provider_with_unset_env_fails() {
        let mut model = mock_model("m", None);
        model.provider = Provider::Openai;
        model.model_id = Some("gpt-4o".to_string());
        model.api_key_env = Some("DEFINITELY_NOT_SET_API_KEY_ENV".to_string());
        assert!(build_adapter(&model).is_err());
    }
}
