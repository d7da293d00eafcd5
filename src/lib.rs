//! # LLM Tournament
//!
//! A modular Rust crate for running structured tournaments in which language-model agents play turn-based games against one another.
//!
//! The value is not in any single game rule set but in the match-execution core:
//! - A turn loop that prompts agents, parses their free-form responses, validates actions against game rules, and escalates violations (`match_runner`)
//! - A referee state machine bounding retries, forfeits, and eliminations (`referee`)
//! - Two tournament formats with concurrent match execution and durable, crash-resumable manifests (`bracket`, `league`)
//! - A determinism layer deriving isolated per-match RNG seeds, so any match can be replayed (`seed`)
//! - A telemetry pipeline writing authoritative per-match JSONL logs and mirroring them to a structured store in the background (`telemetry`, `sink`)
//!
//! Agents are remote services reached through the [`ModelAdapter`](adapter::ModelAdapter) trait;
//! a deterministic offline [`MockAdapter`](adapter::MockAdapter) makes whole tournaments reproducible in tests.
//! Game rules live behind the [`GameEngine`](game_interface::GameEngine) trait; one small
//! built-in event ships in [`games`] so the binary runs end to end out of the box.
//!
//! # Documentation Overview
//!
//! - For the match lifecycle and violation handling, see [`match_runner`] and [`referee`].
//! - For configuration, see [`configuration::TournamentConfig`] and the YAML layout documented there.
//! - For tournament formats, see [`bracket::BracketRunner`] and [`league::LeagueRunner`].
//! - To plug in your own games, implement [`GameEngine`](game_interface::GameEngine) and [`GameEngineFactory`](game_interface::GameEngineFactory).
//! - To reach a new model provider, implement [`ModelAdapter`](adapter::ModelAdapter).
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use llm_tournament::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     // Load the tournament description (models, events, seed, format).
//!     let config = TournamentConfig::load("tournament.yaml")?;
//!
//!     // The engine owns adapters, seeds and telemetry; the factory
//!     // supplies game engines per match.
//!     let engine = Arc::new(TournamentEngine::new(config, Arc::new(BuiltinGameFactory))?);
//!
//!     // Round-robin league with a resumable manifest.
//!     let mut league = LeagueRunner::new(engine)?;
//!     let manifest = league.run()?;
//!     println!(
//!         "completed {}/{} fixtures",
//!         manifest.completed_fixtures, manifest.total_fixtures
//!     );
//!     Ok(())
//! }
//! ```
//!
//! # Determinism
//!
//! Two runs with the same config and the same mock strategies produce
//! the same matches, the same seeds, and the same turn sequences. Seeds
//! derive from a keyed hash of `(event, round, match)` under the
//! tournament master seed, so adding or removing matches never shifts
//! any other match's seed. The process-global RNG is never touched.
#![warn(missing_docs)]

pub mod adapter;
pub mod bracket;
pub mod configuration;
pub mod game_interface;
pub mod games;
pub mod league;
pub mod logger;
mod manifest;
pub mod match_runner;
pub mod model_names;
pub mod parser;
pub mod referee;
pub mod sanitizer;
pub mod seed;
pub mod sink;
pub mod telemetry;
pub mod tournament;

pub use anyhow;

/// Commonly used types for quick access.
///
/// ```rust
/// use llm_tournament::prelude::*;
/// ```
pub mod prelude {
    pub use crate::adapter::{MockAdapter, ModelAdapter};
    pub use crate::bracket::BracketRunner;
    pub use crate::configuration::{TournamentConfig, TournamentFormat};
    pub use crate::game_interface::{GameEngine, GameEngineFactory};
    pub use crate::games::BuiltinGameFactory;
    pub use crate::league::LeagueRunner;
    pub use crate::referee::RefereeConfig;
    pub use crate::tournament::TournamentEngine;
}
