//! Violation tracking, penalty rulings and escalation.
//!
//! One [`Referee`] per match. Tracks violations per player across all
//! turns, allows one retry per player per turn, accumulates strikes for
//! the configured strike kinds, and escalates to turn forfeits, match
//! forfeits (2-player) or player elimination (N-player). Produces a
//! fidelity report at match end.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Categories of player misbehavior.
///
/// The snake_case string forms are persisted in telemetry and consumed
/// downstream; they are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// No parsable, schema-valid action in the output.
    MalformedJson,
    /// A well-formed action the game rules reject.
    IllegalMove,
    /// The adapter did not produce a usable response in time.
    Timeout,
    /// A prompt-injection pattern was detected (never blocking).
    InjectionAttempt,
    /// The adapter returned an empty response.
    EmptyResponse,
}

impl ViolationKind {
    /// Stable string form used in telemetry records.
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::MalformedJson => "malformed_json",
            ViolationKind::IllegalMove => "illegal_move",
            ViolationKind::Timeout => "timeout",
            ViolationKind::InjectionAttempt => "injection_attempt",
            ViolationKind::EmptyResponse => "empty_response",
        }
    }

    /// Default severity weight for this kind.
    pub fn severity(&self) -> u32 {
        match self {
            ViolationKind::MalformedJson => 2,
            ViolationKind::IllegalMove => 1,
            ViolationKind::Timeout => 2,
            ViolationKind::InjectionAttempt => 3,
            ViolationKind::EmptyResponse => 1,
        }
    }
}

/// A referee decision following a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ruling {
    /// Re-prompt the player with an error explanation.
    Retry,
    /// The engine applies its default action for this turn.
    ForfeitTurn,
    /// The match terminates; remaining units go to the opponent
    /// (2-player matches only).
    ForfeitMatch,
    /// The player becomes a dead seat; the match continues among the
    /// remaining players (matches with more than 2 players).
    EliminatePlayer,
}

impl Ruling {
    /// Stable string form used in telemetry records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Ruling::Retry => "retry",
            Ruling::ForfeitTurn => "forfeit_turn",
            Ruling::ForfeitMatch => "forfeit_match",
            Ruling::EliminatePlayer => "eliminate_player",
        }
    }
}

/// Escalation thresholds and the violation kinds that count as strikes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefereeConfig {
    /// Kinds that accumulate cross-turn strikes. Typically transport
    /// failures rather than gameplay mistakes.
    #[serde(default = "default_strike_violations")]
    pub strike_violations: Vec<ViolationKind>,
    /// Once a player's strikes exceed this, strike violations forfeit
    /// the turn immediately (no retry).
    #[serde(default = "default_turn_forfeit_threshold")]
    pub turn_forfeit_threshold: u32,
    /// Once a player's strikes reach this, the match is forfeited
    /// (2-player) or the player is eliminated (N-player).
    #[serde(default = "default_match_forfeit_threshold")]
    pub match_forfeit_threshold: u32,
    /// Identical-prompt repetitions tolerated before the turn loop
    /// force-forfeits the match to guarantee progress.
    #[serde(default = "default_stuck_loop_limit")]
    pub stuck_loop_limit: u32,
}

fn default_strike_violations() -> Vec<ViolationKind> {
    vec![ViolationKind::Timeout, ViolationKind::EmptyResponse]
}

fn default_turn_forfeit_threshold() -> u32 {
    3
}

fn default_match_forfeit_threshold() -> u32 {
    5
}

fn default_stuck_loop_limit() -> u32 {
    3
}

impl Default for RefereeConfig {
    fn default() -> Self {
        Self {
            strike_violations: default_strike_violations(),
            turn_forfeit_threshold: default_turn_forfeit_threshold(),
            match_forfeit_threshold: default_match_forfeit_threshold(),
            stuck_loop_limit: default_stuck_loop_limit(),
        }
    }
}

#[derive(Debug, Clone)]
struct ViolationRecord {
    kind: ViolationKind,
    severity: u32,
    #[allow(dead_code)]
    details: String,
}

/// Per-player violation summary included in every match summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FidelityReport {
    /// Total violations of all kinds.
    pub total_violations: u32,
    /// Count of malformed-output violations.
    pub malformed_json: u32,
    /// Count of rule-rejected actions.
    pub illegal_move: u32,
    /// Count of timeouts (including surfaced transport failures).
    pub timeout: u32,
    /// Count of flagged injection patterns.
    pub injection_attempts: u32,
    /// Count of empty responses.
    pub empty_response: u32,
    /// Sum of severity weights.
    pub total_severity: u32,
    /// Retries the player consumed across the match.
    pub retries_used: u32,
}

/// Tracks violations and issues rulings for a single match.
#[derive(Debug)]
pub struct Referee {
    config: RefereeConfig,
    num_players: usize,
    violations: HashMap<String, Vec<ViolationRecord>>,
    retries_used: HashMap<String, u32>,
    retry_used_this_turn: HashSet<String>,
    turn_violations: HashMap<String, u32>,
    strikes: HashMap<String, u32>,
    eliminated: HashSet<String>,
    match_forfeit: Option<String>,
}

impl Referee {
    /// Create a referee for a match with `num_players` seats.
    pub fn new(config: RefereeConfig, num_players: usize) -> Self {
        Self {
            config,
            num_players,
            violations: HashMap::new(),
            retries_used: HashMap::new(),
            retry_used_this_turn: HashSet::new(),
            turn_violations: HashMap::new(),
            strikes: HashMap::new(),
            eliminated: HashSet::new(),
            match_forfeit: None,
        }
    }

    /// Record a violation and return the ruling.
    ///
    /// First violation by a player within a turn rules a retry; the
    /// second forfeits the turn. Strike kinds escalate across turns:
    /// past the turn threshold they forfeit turns immediately, and at
    /// the match threshold the match is forfeited (2-player) or the
    /// player eliminated (N-player). At most one match forfeit is ever
    /// issued per match.
    pub fn record_violation(
        &mut self,
        player_id: &str,
        kind: ViolationKind,
        details: &str,
    ) -> Ruling {
        self.violations
            .entry(player_id.to_string())
            .or_default()
            .push(ViolationRecord {
                kind,
                severity: kind.severity(),
                details: details.to_string(),
            });
        *self
            .turn_violations
            .entry(player_id.to_string())
            .or_default() += 1;

        let is_strike = self.config.strike_violations.contains(&kind);
        if is_strike {
            *self.strikes.entry(player_id.to_string()).or_default() += 1;
        }
        let strikes = self.strikes.get(player_id).copied().unwrap_or(0);

        if is_strike
            && self.config.match_forfeit_threshold > 0
            && strikes >= self.config.match_forfeit_threshold
        {
            if self.num_players > 2 {
                self.eliminated.insert(player_id.to_string());
                return Ruling::EliminatePlayer;
            }
            if self.match_forfeit.is_none() {
                self.match_forfeit = Some(player_id.to_string());
                return Ruling::ForfeitMatch;
            }
            return Ruling::ForfeitTurn;
        }

        if is_strike
            && self.config.turn_forfeit_threshold > 0
            && strikes > self.config.turn_forfeit_threshold
        {
            return Ruling::ForfeitTurn;
        }

        if self.turn_violations.get(player_id).copied().unwrap_or(0) <= 1 {
            Ruling::Retry
        } else {
            Ruling::ForfeitTurn
        }
    }

    /// True while the player still has this turn's retry available.
    pub fn should_retry(&self, player_id: &str) -> bool {
        !self.retry_used_this_turn.contains(player_id)
    }

    /// Consume the player's per-turn retry.
    pub fn consume_retry(&mut self, player_id: &str) {
        if self.retry_used_this_turn.insert(player_id.to_string()) {
            *self.retries_used.entry(player_id.to_string()).or_default() += 1;
        }
    }

    /// Advance to the next turn: reset per-turn state, keep history.
    pub fn new_turn(&mut self) {
        self.retry_used_this_turn.clear();
        self.turn_violations.clear();
    }

    /// Player ids eliminated by this referee, in no particular order.
    pub fn eliminated_players(&self) -> &HashSet<String> {
        &self.eliminated
    }

    /// The player that forfeited the match, if any.
    pub fn match_forfeiter(&self) -> Option<&str> {
        self.match_forfeit.as_deref()
    }

    /// Cumulative strikes for a player.
    pub fn strikes(&self, player_id: &str) -> u32 {
        self.strikes.get(player_id).copied().unwrap_or(0)
    }

    /// Total violations for a player.
    pub fn total_violations(&self, player_id: &str) -> u32 {
        self.violations
            .get(player_id)
            .map(|v| v.len() as u32)
            .unwrap_or(0)
    }

    /// Build the per-player fidelity report.
    pub fn fidelity_report(&self) -> HashMap<String, FidelityReport> {
        let mut report = HashMap::new();
        for (player_id, records) in &self.violations {
            let mut entry = FidelityReport {
                total_violations: records.len() as u32,
                retries_used: self.retries_used.get(player_id).copied().unwrap_or(0),
                ..Default::default()
            };
            for r in records {
                entry.total_severity += r.severity;
                match r.kind {
                    ViolationKind::MalformedJson => entry.malformed_json += 1,
                    ViolationKind::IllegalMove => entry.illegal_move += 1,
                    ViolationKind::Timeout => entry.timeout += 1,
                    ViolationKind::InjectionAttempt => entry.injection_attempts += 1,
                    ViolationKind::EmptyResponse => entry.empty_response += 1,
                }
            }
            report.insert(player_id.clone(), entry);
        }
        report
    }
}
