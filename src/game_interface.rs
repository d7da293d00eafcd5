//! Traits a game must implement to run under the tournament harness.
//!
//! The harness is agnostic about specific games: the turn loop drives
//! any state machine exposing this contract. Actions, snapshots and
//! action schemas are opaque JSON values so that engines, prompts and
//! telemetry stay self-describing.

use serde_json::Value;

use crate::configuration::EventConfig;

/// Result of validating a player's action against the game rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// True when the action may be applied.
    pub legal: bool,
    /// Explanation when illegal.
    pub reason: Option<String>,
}

impl ValidationResult {
    /// A legal action.
    pub fn legal() -> Self {
        Self {
            legal: true,
            reason: None,
        }
    }

    /// An illegal action with an explanation for the retry prompt.
    pub fn illegal(reason: impl Into<String>) -> Self {
        Self {
            legal: false,
            reason: Some(reason.into()),
        }
    }
}

/// A turn-based game driven by the match runner.
///
/// Implementations must uphold two contracts: `current_player` never
/// returns an eliminated player id, and `get_scores` sums to the
/// event's conserved unit (total chips, total series points, ...) in
/// every terminal state.
pub trait GameEngine: Send {
    /// Initialize or reset state from a per-match seed.
    fn reset(&mut self, seed: u64);

    /// The player id next to act.
    fn current_player(&self) -> String;

    /// Serialize the state into prompt form for the given player.
    ///
    /// Must include a clear structured-output instruction so the model
    /// knows the exact action JSON expected.
    fn get_prompt(&self, player_id: &str) -> String;

    /// Prompt repeating the state with an explicit error prefix.
    fn get_retry_prompt(&self, player_id: &str, error_reason: &str) -> String;

    /// Check an action against the rules. Pure: never mutates state.
    fn validate_action(&self, player_id: &str, action: &Value) -> ValidationResult;

    /// Commit a previously validated action.
    fn apply_action(&mut self, player_id: &str, action: &Value) -> anyhow::Result<()>;

    /// Apply the deterministic default action in place of the player's
    /// invalid response (a no-op that cannot lose if one exists, else
    /// the first legal move in canonical order).
    fn forfeit_turn(&mut self, player_id: &str);

    /// Terminate the match, awarding remaining units to the opponent.
    /// In games with more than two players this is an emergency stop.
    fn force_forfeit_match(&mut self, player_id: &str);

    /// Award all remaining units to the opponent on a 2-player match
    /// forfeit. Series- and chip-based engines should override; the
    /// default delegates to [`GameEngine::force_forfeit_match`].
    fn award_forfeit_wins(&mut self, forfeiting_player_id: &str) {
        self.force_forfeit_match(forfeiting_player_id);
    }

    /// Mark the player a dead seat: still posts mandatory contributions
    /// but is never asked to act again.
    fn eliminate_player(&mut self, player_id: &str);

    /// True when the match is over.
    fn is_terminal(&self) -> bool;

    /// Final scores per player id. Only meaningful once terminal.
    fn get_scores(&self) -> std::collections::HashMap<String, f64>;

    /// Serializable snapshot of the current state for telemetry.
    fn get_state_snapshot(&self) -> Value;

    /// Ordered player ids for this match.
    fn player_ids(&self) -> Vec<String>;

    /// JSON Schema describing valid actions for this event.
    fn action_schema(&self) -> Value;

    /// Hand/game counter within the match, for telemetry.
    fn hand_number(&self) -> u64 {
        0
    }

    /// Phase of play (street, round, ...), for telemetry.
    fn phase(&self) -> String {
        String::new()
    }

    /// Version tag of the rules implementation, stamped into records.
    fn engine_version(&self) -> String {
        "0".to_string()
    }

    /// Version tag of the prompt wording, stamped into records.
    fn prompt_version(&self) -> String {
        "0".to_string()
    }
}

/// Constructs game engines for an event.
///
/// Orchestrators build one engine per match through a factory so that
/// each match owns its state exclusively.
pub trait GameEngineFactory: Send + Sync {
    /// Build an engine for the given event with `num_players` seats.
    fn new_engine(
        &self,
        event: &EventConfig,
        num_players: usize,
    ) -> anyhow::Result<Box<dyn GameEngine>>;
}

#[cfg(test)]
mod interface_tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    struct DummyGame {
        done: bool,
    }

    impl GameEngine for DummyGame {
        fn reset(&mut self, _seed: u64) {
            self.done = false;
        }

        fn current_player(&self) -> String {
            "player_a".to_string()
        }

        fn get_prompt(&self, _player_id: &str) -> String {
            "respond".to_string()
        }

        fn get_retry_prompt(&self, _player_id: &str, error_reason: &str) -> String {
            format!("INVALID ({error_reason}). respond")
        }

        fn validate_action(&self, _player_id: &str, _action: &Value) -> ValidationResult {
            ValidationResult::legal()
        }

        fn apply_action(&mut self, _player_id: &str, _action: &Value) -> anyhow::Result<()> {
            self.done = true;
            Ok(())
        }

        fn forfeit_turn(&mut self, _player_id: &str) {
            self.done = true;
        }

        fn force_forfeit_match(&mut self, _player_id: &str) {
            self.done = true;
        }

        fn eliminate_player(&mut self, _player_id: &str) {}

        fn is_terminal(&self) -> bool {
            self.done
        }

        fn get_scores(&self) -> HashMap<String, f64> {
            HashMap::from([("player_a".to_string(), 1.0)])
        }

        fn get_state_snapshot(&self) -> Value {
            json!({"done": self.done})
        }

        fn player_ids(&self) -> Vec<String> {
            vec!["player_a".to_string()]
        }

        fn action_schema(&self) -> Value {
            json!({"type": "object"})
        }
    }

    fn drive(game: &mut dyn GameEngine) {
        game.reset(0);
        while !game.is_terminal() {
            let player = game.current_player();
            game.apply_action(&player, &json!({})).unwrap();
        }
    }

    #[test]
    fn dyn_engine_is_drivable() {
        let mut game = DummyGame { done: false };
        drive(&mut game);
        assert_eq!(game.get_scores()["player_a"], 1.0);
    }

    #[test]
    fn default_forfeit_delegates() {
        let mut game = DummyGame { done: false };
        game.award_forfeit_wins("player_a");
        assert!(game.is_terminal());
    }
}
