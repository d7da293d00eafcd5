//! High card: the built-in demonstration event.
//!
//! Every hand, each player with chips posts an ante and receives a
//! hidden card (1..=100) from the match RNG. In seat order, each
//! player either holds or folds. The highest card among holders takes
//! the pot. Simple on purpose: it exercises the whole harness (antes,
//! dead seats, busts, forfeits, chip conservation) without burying the
//! tests in game rules.

use std::collections::{HashMap, HashSet};

use anyhow::ensure;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};

use crate::configuration::EventConfig;
use crate::game_interface::{GameEngine, GameEngineFactory, ValidationResult};

const ENGINE_VERSION: &str = "1.0";
const PROMPT_VERSION: &str = "1";

/// Builds [`HighCard`] engines from an event config.
pub struct HighCardFactory;

impl GameEngineFactory for HighCardFactory {
    fn new_engine(
        &self,
        event: &EventConfig,
        num_players: usize,
    ) -> anyhow::Result<Box<dyn GameEngine>> {
        Ok(Box::new(HighCard::from_event(event, num_players)?))
    }
}

/// The high-card chip game.
pub struct HighCard {
    starting_stack: i64,
    hands_per_match: u64,
    ante: i64,
    player_ids: Vec<String>,
    rng: ChaCha8Rng,
    stacks: Vec<i64>,
    hand: u64,
    pot: i64,
    in_hand: Vec<bool>,
    cards: Vec<u8>,
    decisions: Vec<Option<bool>>,
    dead_seats: HashSet<usize>,
    terminal: bool,
}

impl HighCard {
    /// Build an engine from the event parameters. The small blind acts
    /// as the per-hand ante.
    pub fn from_event(event: &EventConfig, num_players: usize) -> anyhow::Result<Self> {
        Self::new(
            event.starting_stack as i64,
            event.hands_per_match as u64,
            event.blinds.0 as i64,
            num_players,
        )
    }

    /// Build an engine with explicit parameters.
    pub fn new(
        starting_stack: i64,
        hands_per_match: u64,
        ante: i64,
        num_players: usize,
    ) -> anyhow::Result<Self> {
        ensure!(num_players >= 2, "high_card needs at least 2 players");
        ensure!(starting_stack > 0, "starting stack must be positive");
        ensure!(ante > 0, "ante must be positive");
        let player_ids = (0..num_players)
            .map(|i| {
                if num_players <= 26 {
                    format!("player_{}", (b'a' + i as u8) as char)
                } else {
                    format!("player_{}", i + 1)
                }
            })
            .collect();
        Ok(Self {
            starting_stack,
            hands_per_match,
            ante,
            player_ids,
            rng: ChaCha8Rng::seed_from_u64(0),
            stacks: vec![starting_stack; num_players],
            hand: 0,
            pot: 0,
            in_hand: vec![false; num_players],
            cards: vec![0; num_players],
            decisions: vec![Some(false); num_players],
            dead_seats: HashSet::new(),
            terminal: false,
        })
    }

    fn index_of(&self, player_id: &str) -> Option<usize> {
        self.player_ids.iter().position(|p| p == player_id)
    }

    fn chip_holders(&self) -> usize {
        self.stacks.iter().filter(|&&s| s > 0).count()
    }

    /// Start the next hand. Returns false when the match ended instead.
    fn deal_hand(&mut self) -> bool {
        if self.hand >= self.hands_per_match || self.chip_holders() <= 1 {
            self.terminal = true;
            return false;
        }
        self.hand += 1;
        for i in 0..self.player_ids.len() {
            if self.stacks[i] > 0 {
                self.in_hand[i] = true;
                // All-in antes: a short stack posts what it has.
                let posted = self.ante.min(self.stacks[i]);
                self.stacks[i] -= posted;
                self.pot += posted;
                self.cards[i] = self.rng.gen_range(1..=100);
                // Dead seats pay but never act.
                self.decisions[i] = if self.dead_seats.contains(&i) {
                    Some(false)
                } else {
                    None
                };
            } else {
                self.in_hand[i] = false;
                self.cards[i] = 0;
                self.decisions[i] = Some(false);
            }
        }
        true
    }

    fn has_undecided(&self) -> bool {
        (0..self.player_ids.len()).any(|i| self.in_hand[i] && self.decisions[i].is_none())
    }

    /// Award the pot: highest card among holders, or highest card among
    /// all dealt players when everyone folded (the chips must land
    /// somewhere for conservation to hold).
    fn resolve_hand(&mut self) {
        let holders: Vec<usize> = (0..self.player_ids.len())
            .filter(|&i| self.in_hand[i] && self.decisions[i] == Some(true))
            .collect();
        let pool: Vec<usize> = if holders.is_empty() {
            (0..self.player_ids.len())
                .filter(|&i| self.in_hand[i])
                .collect()
        } else {
            holders
        };
        if let Some(&winner) = pool.iter().max_by_key(|&&i| (self.cards[i], usize::MAX - i)) {
            self.stacks[winner] += self.pot;
            self.pot = 0;
        }
        for i in 0..self.player_ids.len() {
            self.in_hand[i] = false;
        }
    }

    /// Deal hands until one needs a decision or the match ends.
    fn advance(&mut self) {
        loop {
            if !self.deal_hand() {
                return;
            }
            if self.has_undecided() {
                return;
            }
            self.resolve_hand();
        }
    }

    fn decide(&mut self, index: usize, hold: bool) {
        self.decisions[index] = Some(hold);
        if !self.has_undecided() {
            self.resolve_hand();
            self.advance();
        }
    }
}

impl GameEngine for HighCard {
    fn reset(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.stacks = vec![self.starting_stack; self.player_ids.len()];
        self.hand = 0;
        self.pot = 0;
        self.dead_seats.clear();
        self.terminal = false;
        self.advance();
    }

    fn current_player(&self) -> String {
        (0..self.player_ids.len())
            .find(|&i| self.in_hand[i] && self.decisions[i].is_none())
            .map(|i| self.player_ids[i].clone())
            .unwrap_or_else(|| self.player_ids[0].clone())
    }

    fn get_prompt(&self, player_id: &str) -> String {
        let Some(index) = self.index_of(player_id) else {
            return String::new();
        };
        let others = self
            .player_ids
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(i, p)| format!("{p}: {} chips", self.stacks[i]))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "You are playing high card, hand {hand} of {total}.\n\
             Your hidden card: {card} (1-100, higher wins).\n\
             Your stack: {stack} chips. Pot: {pot} chips.\n\
             Opponents: {others}.\n\
             Hold to contest the pot with your card, or fold to give it up.\n\
             Respond with a single JSON object and nothing else:\n\
             {{\"action\": \"hold\"}} or {{\"action\": \"fold\"}}",
            hand = self.hand,
            total = self.hands_per_match,
            card = self.cards[index],
            stack = self.stacks[index],
            pot = self.pot,
        )
    }

    fn get_retry_prompt(&self, player_id: &str, error_reason: &str) -> String {
        format!(
            "Your previous response was invalid: {error_reason}\n\n{}",
            self.get_prompt(player_id)
        )
    }

    fn validate_action(&self, player_id: &str, action: &Value) -> ValidationResult {
        let Some(index) = self.index_of(player_id) else {
            return ValidationResult::illegal(format!("unknown player {player_id}"));
        };
        if !self.in_hand[index] || self.decisions[index].is_some() {
            return ValidationResult::illegal("it is not your turn to act");
        }
        match action["action"].as_str() {
            Some("hold") | Some("fold") => ValidationResult::legal(),
            other => ValidationResult::illegal(format!("unknown action {other:?}")),
        }
    }

    fn apply_action(&mut self, player_id: &str, action: &Value) -> anyhow::Result<()> {
        let index = self
            .index_of(player_id)
            .ok_or_else(|| anyhow::anyhow!("unknown player {player_id}"))?;
        let hold = action["action"].as_str() == Some("hold");
        self.decide(index, hold);
        Ok(())
    }

    fn forfeit_turn(&mut self, player_id: &str) {
        if let Some(index) = self.index_of(player_id) {
            if self.in_hand[index] && self.decisions[index].is_none() {
                self.decide(index, false);
            }
        }
    }

    fn force_forfeit_match(&mut self, player_id: &str) {
        let Some(index) = self.index_of(player_id) else {
            return;
        };
        if self.player_ids.len() == 2 {
            // Award everything, pot included, to the opponent.
            let opponent = 1 - index;
            self.stacks[opponent] += self.stacks[index] + self.pot;
            self.stacks[index] = 0;
            self.pot = 0;
        } else {
            // Emergency stop: settle the live pot to the best other
            // hand so chips stay conserved, then freeze the stacks.
            if self.pot > 0 {
                let pool: Vec<usize> = (0..self.player_ids.len())
                    .filter(|&i| self.in_hand[i] && i != index)
                    .collect();
                if let Some(&best) = pool.iter().max_by_key(|&&i| (self.cards[i], usize::MAX - i))
                {
                    self.stacks[best] += self.pot;
                } else {
                    self.stacks[index] += self.pot;
                }
                self.pot = 0;
            }
        }
        self.terminal = true;
    }

    fn eliminate_player(&mut self, player_id: &str) {
        if let Some(index) = self.index_of(player_id) {
            self.dead_seats.insert(index);
            if self.in_hand[index] && self.decisions[index].is_none() {
                self.decide(index, false);
            }
        }
    }

    fn is_terminal(&self) -> bool {
        self.terminal
    }

    fn get_scores(&self) -> HashMap<String, f64> {
        self.player_ids
            .iter()
            .zip(&self.stacks)
            .map(|(p, &s)| (p.clone(), s as f64))
            .collect()
    }

    fn get_state_snapshot(&self) -> Value {
        let stacks: HashMap<&String, i64> = self
            .player_ids
            .iter()
            .zip(&self.stacks)
            .map(|(p, &s)| (p, s))
            .collect();
        let dead: Vec<&String> = self
            .dead_seats
            .iter()
            .map(|&i| &self.player_ids[i])
            .collect();
        let busted: Vec<&String> = self
            .player_ids
            .iter()
            .enumerate()
            .filter(|(i, _)| self.stacks[*i] == 0 && !self.in_hand[*i])
            .map(|(_, p)| p)
            .collect();
        json!({
            "hand_number": self.hand,
            "pot": self.pot,
            "stacks": stacks,
            "dead_seats": dead,
            "busted": busted,
        })
    }

    fn player_ids(&self) -> Vec<String> {
        self.player_ids.clone()
    }

    fn action_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["hold", "fold"]},
                "reasoning": {"type": "string"}
            },
            "required": ["action"],
            "additionalProperties": false
        })
    }

    fn hand_number(&self) -> u64 {
        self.hand
    }

    fn phase(&self) -> String {
        "decision".to_string()
    }

    fn engine_version(&self) -> String {
        ENGINE_VERSION.to_string()
    }

    fn prompt_version(&self) -> String {
        PROMPT_VERSION.to_string()
    }
}
