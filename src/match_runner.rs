//! The turn loop: drives one match from reset to terminal state.
//!
//! Per turn: prompt the engine's current player, query its adapter,
//! sanitize and parse the output, validate the action against the
//! rules, and apply it. Every failure is reified as a violation and
//! ruled on by the referee (retry, forfeit turn, forfeit match,
//! eliminate). One telemetry record is emitted per *attempted* action,
//! retries included. A stuck-loop guard force-forfeits the match when
//! prompting stops changing the state, so the system always makes
//! progress.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, instrument, trace, warn};

use crate::adapter::{AdapterErrorKind, Message, ModelAdapter, QueryContext};
use crate::game_interface::GameEngine;
use crate::parser::{self, EventSchema};
use crate::referee::{FidelityReport, Referee, RefereeConfig, Ruling, ViolationKind};
use crate::sanitizer::sanitize;
use crate::telemetry::{TelemetryLogger, TurnRecord};

/// Query limits for one player slot.
#[derive(Debug, Clone, Copy)]
pub struct QueryCaps {
    /// Output token cap per query.
    pub max_output_tokens: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Everything one match needs besides its engine.
pub struct MatchSettings {
    /// Pre-generated match identifier.
    pub match_id: String,
    /// Event name.
    pub event: String,
    /// Per-match RNG seed.
    pub seed: u64,
    /// Player slot → model name, covering every engine player id.
    pub player_models: HashMap<String, String>,
    /// Player slot → adapter.
    pub adapters: HashMap<String, Arc<dyn ModelAdapter>>,
    /// Player slot → query caps.
    pub caps: HashMap<String, QueryCaps>,
    /// Escalation thresholds for the referee.
    pub referee_config: RefereeConfig,
}

impl std::fmt::Display for MatchSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.match_id)
    }
}

/// Outcome of a completed match.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// Match identifier.
    pub match_id: String,
    /// Final score per player slot.
    pub scores: HashMap<String, f64>,
    /// Player slot → model name.
    pub player_models: HashMap<String, String>,
    /// Per-player violation summary.
    pub fidelity: HashMap<String, FidelityReport>,
    /// Winning model per the slot-order tiebreak chain.
    pub winner: Option<String>,
}

impl MatchResult {
    /// Total violations committed by the given slot.
    pub fn violations(&self, player_id: &str) -> u32 {
        self.fidelity
            .get(player_id)
            .map(|f| f.total_violations)
            .unwrap_or(0)
    }
}

/// Map a surfaced adapter failure to its violation kind.
///
/// Rate limits and generic API errors count as timeouts: they are
/// infrastructure failures, strike-eligible like any other transport
/// problem. The original kind is preserved in the violation details.
fn violation_for(kind: AdapterErrorKind) -> ViolationKind {
    match kind {
        AdapterErrorKind::Timeout => ViolationKind::Timeout,
        AdapterErrorKind::EmptyResponse => ViolationKind::EmptyResponse,
        AdapterErrorKind::RateLimit | AdapterErrorKind::ApiError => ViolationKind::Timeout,
    }
}

/// Pick the match winner from scores with the tiebreak chain:
/// higher score, then fewer total violations, then earlier slot
/// (slot order is seed order).
pub fn derive_winner(
    scores: &HashMap<String, f64>,
    fidelity: &HashMap<String, FidelityReport>,
    slot_order: &[String],
    player_models: &HashMap<String, String>,
) -> Option<String> {
    let mut best: Option<&String> = None;
    for player in slot_order {
        let Some(candidate) = best else {
            best = Some(player);
            continue;
        };
        let score_best = scores.get(candidate).copied().unwrap_or(0.0);
        let score_cur = scores.get(player).copied().unwrap_or(0.0);
        if score_cur > score_best {
            best = Some(player);
            continue;
        }
        if score_cur < score_best {
            continue;
        }
        let viol_best = fidelity.get(candidate).map(|f| f.total_violations).unwrap_or(0);
        let viol_cur = fidelity.get(player).map(|f| f.total_violations).unwrap_or(0);
        if viol_cur < viol_best {
            best = Some(player);
        }
        // Equal score and violations: the earlier slot keeps the win.
    }
    best.and_then(|p| player_models.get(p).cloned())
}

/// Drive a match to completion, emitting telemetry along the way.
///
/// Turn-level failures are recovered locally through the referee;
/// engine and telemetry-file errors bubble to the orchestrator.
#[instrument(skip_all, fields(match_id = settings.match_id))]
pub fn run_match(
    settings: MatchSettings,
    mut engine: Box<dyn GameEngine>,
    mut logger: TelemetryLogger,
) -> anyhow::Result<MatchResult> {
    trace!("match started");
    let schema = EventSchema::compile(&engine.action_schema())
        .with_context(|| format!("event {} has an invalid action schema", settings.event))?;

    engine.reset(settings.seed);
    let player_ids = engine.player_ids();
    let mut referee = Referee::new(settings.referee_config.clone(), player_ids.len());
    let strike_limit = match settings.referee_config.match_forfeit_threshold {
        0 => None,
        n => Some(n),
    };
    let stuck_limit = settings.referee_config.stuck_loop_limit;

    let mut turn_number: u64 = 0;
    let mut last_prompt: Option<String> = None;
    let mut stuck_count: u32 = 0;

    while !engine.is_terminal() {
        let player = engine.current_player();
        let base_prompt = engine.get_prompt(&player);

        // Stuck-loop defense: identical prompt over and over means the
        // state is not advancing. Force the match to end.
        if last_prompt.as_deref() == Some(base_prompt.as_str()) {
            stuck_count += 1;
            if stuck_count > stuck_limit {
                warn!(%player, "stuck loop detected, forcing match forfeit");
                engine.force_forfeit_match(&player);
                break;
            }
        } else {
            stuck_count = 0;
            last_prompt = Some(base_prompt.clone());
        }

        referee.new_turn();
        let mut retry_reason: Option<String> = None;

        // Attempts within this engine turn (first try plus retries).
        loop {
            turn_number += 1;
            let prompt = match &retry_reason {
                Some(reason) => engine.get_retry_prompt(&player, reason),
                None => base_prompt.clone(),
            };

            let model = settings
                .player_models
                .get(&player)
                .with_context(|| format!("no model mapped to player {player}"))?;
            let adapter = settings
                .adapters
                .get(&player)
                .with_context(|| format!("no adapter mapped to player {player}"))?;
            let caps = settings
                .caps
                .get(&player)
                .with_context(|| format!("no caps mapped to player {player}"))?;

            let context = QueryContext {
                match_id: settings.match_id.clone(),
                player_id: player.clone(),
                event: settings.event.clone(),
                turn_number,
            };
            let time_limit_ms = caps.timeout.as_millis() as u64;

            let mut record = TurnRecord {
                turn_number,
                hand_number: engine.hand_number(),
                street: engine.phase(),
                player_id: player.clone(),
                model_id: model.clone(),
                model_version: model.clone(),
                prompt: prompt.clone(),
                raw_output: String::new(),
                reasoning_output: None,
                parsed_action: None,
                parse_success: false,
                validation_result: "n/a".to_string(),
                violation: None,
                ruling: None,
                state_snapshot: engine.get_state_snapshot(),
                input_tokens: 0,
                output_tokens: 0,
                latency_ms: 0.0,
                engine_version: engine.engine_version(),
                prompt_version: engine.prompt_version(),
                time_limit_ms: Some(time_limit_ms),
                time_exceeded: false,
                cumulative_strikes: 0,
                strike_limit,
            };

            let ruling = match adapter.query(
                &[Message::user(&prompt)],
                caps.max_output_tokens,
                caps.timeout,
                &context,
            ) {
                Err(err) => {
                    let kind = violation_for(err.kind);
                    debug!(%player, %err, "adapter error");
                    let ruling = referee.record_violation(&player, kind, &err.to_string());
                    record.violation = Some(kind.as_str().to_string());
                    record.ruling = Some(ruling.as_str().to_string());
                    record.time_exceeded = err.kind == AdapterErrorKind::Timeout;
                    record.cumulative_strikes = referee.strikes(&player);
                    logger.log_turn(&record)?;
                    retry_reason = Some(err.to_string());
                    Some(ruling)
                }
                Ok(response) => {
                    let clean = sanitize(&response.raw_text);
                    let outcome = parser::parse(&clean, &schema);

                    record.raw_output = clean;
                    record.reasoning_output = response.reasoning_text.clone();
                    record.input_tokens = response.input_tokens;
                    record.output_tokens = response.output_tokens;
                    record.latency_ms = response.latency_ms;
                    record.model_version = response.model_version.clone();
                    record.time_exceeded = response.latency_ms > time_limit_ms as f64;

                    if outcome.injection_detected {
                        // Flag only: the action still counts if valid.
                        let _ = referee.record_violation(
                            &player,
                            ViolationKind::InjectionAttempt,
                            "injection pattern in output",
                        );
                        record.violation =
                            Some(ViolationKind::InjectionAttempt.as_str().to_string());
                    }

                    if !outcome.success {
                        let reason = outcome
                            .error
                            .unwrap_or_else(|| "unparseable output".to_string());
                        let ruling = referee.record_violation(
                            &player,
                            ViolationKind::MalformedJson,
                            &reason,
                        );
                        record.violation =
                            Some(ViolationKind::MalformedJson.as_str().to_string());
                        record.ruling = Some(ruling.as_str().to_string());
                        record.cumulative_strikes = referee.strikes(&player);
                        logger.log_turn(&record)?;
                        retry_reason = Some(reason);
                        Some(ruling)
                    } else {
                        let action = outcome
                            .action
                            .expect("successful parse carries an action");
                        record.parsed_action = Some(action.clone());
                        record.parse_success = true;

                        let validation = engine.validate_action(&player, &action);
                        if !validation.legal {
                            let reason = validation
                                .reason
                                .unwrap_or_else(|| "illegal move".to_string());
                            let ruling = referee.record_violation(
                                &player,
                                ViolationKind::IllegalMove,
                                &reason,
                            );
                            record.validation_result = reason.clone();
                            record.violation =
                                Some(ViolationKind::IllegalMove.as_str().to_string());
                            record.ruling = Some(ruling.as_str().to_string());
                            record.cumulative_strikes = referee.strikes(&player);
                            logger.log_turn(&record)?;
                            retry_reason = Some(reason);
                            Some(ruling)
                        } else {
                            engine
                                .apply_action(&player, &action)
                                .with_context(|| format!("engine rejected validated action from {player}"))?;
                            record.validation_result = "legal".to_string();
                            record.cumulative_strikes = referee.strikes(&player);
                            logger.log_turn(&record)?;
                            None
                        }
                    }
                }
            };

            match ruling {
                None => break, // action applied, turn complete
                Some(Ruling::Retry) => {
                    if referee.should_retry(&player) {
                        referee.consume_retry(&player);
                        continue;
                    }
                    engine.forfeit_turn(&player);
                    break;
                }
                Some(Ruling::ForfeitTurn) => {
                    engine.forfeit_turn(&player);
                    break;
                }
                Some(Ruling::ForfeitMatch) => {
                    warn!(%player, "match forfeited");
                    engine.award_forfeit_wins(&player);
                    break;
                }
                Some(Ruling::EliminatePlayer) => {
                    warn!(%player, "player eliminated");
                    engine.eliminate_player(&player);
                    break;
                }
            }
        }
    }

    let scores = engine.get_scores();
    let fidelity = referee.fidelity_report();
    let winner = derive_winner(&scores, &fidelity, &player_ids, &settings.player_models);
    logger.finalize_match(&scores, &fidelity, &settings.player_models, winner.as_deref())?;

    trace!("match end");
    Ok(MatchResult {
        match_id: settings.match_id,
        scores,
        player_models: settings.player_models,
        fidelity,
        winner,
    })
}
