//! Seeded single-elimination bracket orchestrator.
//!
//! Seeding follows config order. Round-1 pairings use the standard
//! bracket recursion, so the two top seeds cannot meet before the
//! final. Every round's match ids are generated before any match
//! starts and the manifest is rewritten atomically on every state
//! transition, so an observer always sees a consistent bracket.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::configuration::EventConfig;
use crate::manifest;
use crate::match_runner::MatchResult;
use crate::tournament::TournamentEngine;

/// One matchup in a bracket round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketMatch {
    /// Index within the round.
    pub position: usize,
    /// Seed number of the first slot (lower is better).
    pub seed_a: u32,
    /// Model in the first slot.
    pub model_a: String,
    /// Seed number of the second slot.
    pub seed_b: u32,
    /// Model in the second slot.
    pub model_b: String,
    /// Pre-generated match id; set before the round starts.
    pub match_id: Option<String>,
    /// Final scores keyed `player_a` / `player_b`.
    #[serde(default)]
    pub scores: HashMap<String, f64>,
    /// Winning model.
    pub winner: Option<String>,
    /// Winning model's seed.
    pub winner_seed: Option<u32>,
}

/// One bracket round in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketRound {
    /// 1-based round number.
    pub round: u32,
    /// Display label (FINAL, SEMIFINALS, ...).
    pub label: String,
    /// `in_progress` or `complete`.
    pub status: String,
    /// The round's matchups.
    pub matches: Vec<BracketMatch>,
}

/// A seed assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEntry {
    /// 1-based seed number.
    pub seed: u32,
    /// Model holding the seed.
    pub model: String,
}

/// Durable snapshot of the bracket state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketManifest {
    /// Tournament name.
    pub tournament_name: String,
    /// The single event being played.
    pub event: String,
    /// Number of competing models.
    pub num_models: usize,
    /// log2(num_models) rounds in total.
    pub num_rounds: u32,
    /// Seed assignments in config order.
    pub seeds: Vec<SeedEntry>,
    /// Rounds played or in progress so far.
    pub rounds: Vec<BracketRound>,
    /// The tournament winner, once decided.
    pub champion: Option<String>,
    /// `in_progress` or `complete`.
    pub status: String,
}

/// Standard bracket pairings for `n` seeds (1-indexed).
///
/// `P(2) = [(1,2)]`; each pair `(a, b)` of the half-size bracket
/// expands to `(a, n+1-a), (b, n+1-b)`. Seeds 1 and 2 land in opposite
/// halves, so favorites meet in the final.
pub fn bracket_pairings(n: usize) -> Vec<(u32, u32)> {
    if n <= 2 {
        return vec![(1, 2)];
    }
    let full = n as u32;
    bracket_pairings(n / 2)
        .into_iter()
        .flat_map(|(a, b)| [(a, full + 1 - a), (b, full + 1 - b)])
        .collect()
}

fn round_label(round_number: u32, total_rounds: u32) -> String {
    match total_rounds - round_number + 1 {
        1 => "FINAL".to_string(),
        2 => "SEMIFINALS".to_string(),
        3 => "QUARTERFINALS".to_string(),
        _ => format!("ROUND {round_number}"),
    }
}

/// Pick the winner of a bracket match.
///
/// Tiebreakers: higher score, fewer total violations, better (lower)
/// seed number.
fn determine_winner(result: &MatchResult, bm: &BracketMatch) -> (String, u32) {
    let slot = |model: &str| -> Option<String> {
        result
            .player_models
            .iter()
            .find(|(_, m)| m.as_str() == model)
            .map(|(pid, _)| pid.clone())
    };
    let pid_a = slot(&bm.model_a).unwrap_or_default();
    let pid_b = slot(&bm.model_b).unwrap_or_default();
    let score_a = result.scores.get(&pid_a).copied().unwrap_or(0.0);
    let score_b = result.scores.get(&pid_b).copied().unwrap_or(0.0);

    if score_a > score_b {
        return (bm.model_a.clone(), bm.seed_a);
    }
    if score_b > score_a {
        return (bm.model_b.clone(), bm.seed_b);
    }

    let viol_a = result.violations(&pid_a);
    let viol_b = result.violations(&pid_b);
    if viol_a < viol_b {
        return (bm.model_a.clone(), bm.seed_a);
    }
    if viol_b < viol_a {
        return (bm.model_b.clone(), bm.seed_b);
    }

    if bm.seed_a <= bm.seed_b {
        (bm.model_a.clone(), bm.seed_a)
    } else {
        (bm.model_b.clone(), bm.seed_b)
    }
}

/// Runs a single-elimination bracket tournament.
pub struct BracketRunner {
    engine: Arc<TournamentEngine>,
    event: EventConfig,
    seeds: Vec<SeedEntry>,
    num_rounds: u32,
    rounds: Vec<BracketRound>,
    champion: Option<String>,
    manifest_path: PathBuf,
    pause_before_final: bool,
}

impl BracketRunner {
    /// Validate the config and prepare the runner.
    ///
    /// Bracket mode requires a power-of-two model count (at least 2)
    /// and exactly one event.
    pub fn new(engine: Arc<TournamentEngine>) -> anyhow::Result<Self> {
        let config = engine.config();
        let n = config.models.len();
        if n < 2 || !n.is_power_of_two() {
            bail!("bracket mode requires a power-of-2 number of models, got {n}");
        }
        if config.events.len() != 1 {
            bail!(
                "bracket mode requires exactly one event, got {}",
                config.events.len()
            );
        }

        let event = config.events[0].clone();
        let seeds = config
            .models
            .iter()
            .enumerate()
            .map(|(i, m)| SeedEntry {
                seed: i as u32 + 1,
                model: m.name.clone(),
            })
            .collect();
        let manifest_path = engine
            .telemetry_dir()
            .join(format!("bracket-{}.json", config.name));

        Ok(Self {
            num_rounds: n.ilog2(),
            engine,
            event,
            seeds,
            rounds: Vec::new(),
            champion: None,
            manifest_path,
            pause_before_final: false,
        })
    }

    /// Wait for confirmation on stdin before starting the final.
    pub fn with_pause_before_final(mut self, pause: bool) -> Self {
        self.pause_before_final = pause;
        self
    }

    /// Path of the bracket manifest.
    pub fn manifest_path(&self) -> &std::path::Path {
        &self.manifest_path
    }

    /// Execute the full bracket and return the final manifest.
    pub fn run(&mut self) -> anyhow::Result<BracketManifest> {
        let seed_model: HashMap<u32, String> = self
            .seeds
            .iter()
            .map(|s| (s.seed, s.model.clone()))
            .collect();

        let mut current: Vec<BracketMatch> = bracket_pairings(self.seeds.len())
            .into_iter()
            .enumerate()
            .map(|(i, (sa, sb))| BracketMatch {
                position: i,
                seed_a: sa,
                model_a: seed_model[&sa].clone(),
                seed_b: sb,
                model_b: seed_model[&sb].clone(),
                match_id: None,
                scores: HashMap::new(),
                winner: None,
                winner_seed: None,
            })
            .collect();

        for round in 1..=self.num_rounds {
            let label = round_label(round, self.num_rounds);
            info!(round, %label, "bracket round starting");
            println!("\n{}", "=".repeat(50));
            println!("  {label} (Round {round}/{})", self.num_rounds);
            println!("{}", "=".repeat(50));

            if self.pause_before_final && round == self.num_rounds {
                println!("Press Enter to start the final...");
                let mut line = String::new();
                let _ = std::io::stdin().read_line(&mut line);
            }

            // Match ids exist before any match starts, so the manifest
            // can reference in-flight matches.
            for (i, bm) in current.iter_mut().enumerate() {
                let suffix = self.engine.match_suffix(&self.event.name, round, i as u32);
                bm.match_id = Some(format!(
                    "{}-{}-vs-{}-{suffix}",
                    self.event.name, bm.model_a, bm.model_b
                ));
            }
            self.rounds.push(BracketRound {
                round,
                label: label.clone(),
                status: "in_progress".to_string(),
                matches: current.clone(),
            });
            self.write_manifest()?;

            self.run_round(&mut current, round)?;

            let finished = self
                .rounds
                .last_mut()
                .expect("round was pushed above");
            finished.status = "complete".to_string();
            finished.matches = current.clone();
            self.write_manifest()?;

            if round < self.num_rounds {
                current = current
                    .chunks(2)
                    .enumerate()
                    .map(|(i, pair)| {
                        let (w1, w2) = (&pair[0], &pair[1]);
                        BracketMatch {
                            position: i,
                            seed_a: w1.winner_seed.unwrap_or(w1.seed_a),
                            model_a: w1.winner.clone().unwrap_or_else(|| w1.model_a.clone()),
                            seed_b: w2.winner_seed.unwrap_or(w2.seed_b),
                            model_b: w2.winner.clone().unwrap_or_else(|| w2.model_b.clone()),
                            match_id: None,
                            scores: HashMap::new(),
                            winner: None,
                            winner_seed: None,
                        }
                    })
                    .collect();
            }
        }

        self.champion = current[0].winner.clone();
        self.write_manifest()?;
        info!(champion = ?self.champion, "bracket complete");
        Ok(self.build_manifest())
    }

    /// Run all matches in a round concurrently, one worker per match.
    fn run_round(&mut self, matchups: &mut [BracketMatch], round: u32) -> anyhow::Result<()> {
        let (tx, rx) = mpsc::channel();
        let mut workers = Vec::with_capacity(matchups.len());
        for (i, bm) in matchups.iter().enumerate() {
            let engine = self.engine.clone();
            let event = self.event.clone();
            let models = vec![bm.model_a.clone(), bm.model_b.clone()];
            let match_id = bm
                .match_id
                .clone()
                .expect("match ids are generated before the round runs");
            let tx = tx.clone();
            workers.push(std::thread::spawn(move || {
                let result = engine.run_match(&event, &models, &match_id, round, i as u32);
                let _ = tx.send((i, result));
            }));
        }
        drop(tx);

        for _ in 0..matchups.len() {
            let (i, result) = rx.recv().context("bracket match worker disconnected")?;
            let result = result
                .with_context(|| format!("bracket match at position {i} in round {round} failed"))?;
            let bm = &mut matchups[i];
            let slot = |model: &str| -> Option<&String> {
                result
                    .player_models
                    .iter()
                    .find(|(_, m)| m.as_str() == model)
                    .map(|(pid, _)| pid)
            };
            if let Some(pid) = slot(&bm.model_a) {
                bm.scores.insert(
                    "player_a".to_string(),
                    result.scores.get(pid).copied().unwrap_or(0.0),
                );
            }
            if let Some(pid) = slot(&bm.model_b) {
                bm.scores.insert(
                    "player_b".to_string(),
                    result.scores.get(pid).copied().unwrap_or(0.0),
                );
            }
            let (winner, winner_seed) = determine_winner(&result, bm);
            println!("  {} vs {}", bm.model_a, bm.model_b);
            println!(
                "    Score: {:.0} - {:.0}",
                bm.scores.get("player_a").copied().unwrap_or(0.0),
                bm.scores.get("player_b").copied().unwrap_or(0.0)
            );
            println!("    Winner: {winner}");
            bm.winner = Some(winner);
            bm.winner_seed = Some(winner_seed);

            let in_progress = self.rounds.last_mut().expect("current round exists");
            in_progress.matches[i] = matchups[i].clone();
            self.write_manifest()?;
        }

        for worker in workers {
            let _ = worker.join();
        }
        Ok(())
    }

    fn build_manifest(&self) -> BracketManifest {
        BracketManifest {
            tournament_name: self.engine.config().name.clone(),
            event: self.event.name.clone(),
            num_models: self.seeds.len(),
            num_rounds: self.num_rounds,
            seeds: self.seeds.clone(),
            rounds: self.rounds.clone(),
            champion: self.champion.clone(),
            status: if self.champion.is_some() {
                "complete".to_string()
            } else {
                "in_progress".to_string()
            },
        }
    }

    fn write_manifest(&self) -> anyhow::Result<()> {
        manifest::write_atomic(&self.manifest_path, &self.build_manifest())
    }

    /// Print a text rendering of the bracket tree to stdout.
    pub fn print_bracket(&self) {
        if self.rounds.is_empty() {
            return;
        }
        println!("\n{}", "=".repeat(50));
        println!("  BRACKET: {}", self.engine.config().name);
        println!("{}", "=".repeat(50));
        for round in &self.rounds {
            println!("\n  {}:", round.label);
            for m in &round.matches {
                let marker = if m.winner.is_some() { " *" } else { "" };
                println!(
                    "    [{}] {} vs [{}] {}{marker}",
                    m.seed_a, m.model_a, m.seed_b, m.model_b
                );
                if !m.scores.is_empty() {
                    println!(
                        "        {:.0} - {:.0}",
                        m.scores.get("player_a").copied().unwrap_or(0.0),
                        m.scores.get("player_b").copied().unwrap_or(0.0)
                    );
                }
                if let Some(winner) = &m.winner {
                    println!("        Winner: {winner}");
                }
            }
        }
        if let Some(champion) = &self.champion {
            println!("\n  CHAMPION: {champion}");
        }
    }
}
