//! Built-in game engines.
//!
//! Game rule engines are external collaborators as far as the harness
//! is concerned; this module carries one small representative event so
//! the binary runs end to end out of the box. Real deployments register
//! their own [`GameEngineFactory`](crate::game_interface::GameEngineFactory).

mod high_card;

pub use high_card::{HighCard, HighCardFactory};

use anyhow::bail;

use crate::configuration::EventConfig;
use crate::game_interface::{GameEngine, GameEngineFactory};

/// Factory resolving event names to the built-in engines.
///
/// Unknown event names fail fast at match construction.
pub struct BuiltinGameFactory;

impl GameEngineFactory for BuiltinGameFactory {
    fn new_engine(
        &self,
        event: &EventConfig,
        num_players: usize,
    ) -> anyhow::Result<Box<dyn GameEngine>> {
        match event.name.as_str() {
            "high_card" => Ok(Box::new(HighCard::from_event(event, num_players)?)),
            other => bail!("no built-in engine for event '{other}'"),
        }
    }
}
