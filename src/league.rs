//! Round-robin league orchestrator with a resumable manifest.
//!
//! All fixtures are generated up front. Progress persists to a JSON
//! manifest after every fixture transition, so a killed run resumes
//! with only its pending fixtures: completed fixtures are trusted
//! as-is, and any fixture found `in_progress` on load is assumed
//! crashed and reset to `pending`. Events run in parallel, one worker
//! thread per event; manifest writes are serialized through a single
//! lock.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::manifest;
use crate::referee::FidelityReport;
use crate::tournament::TournamentEngine;

/// Lifecycle of a scheduled fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureStatus {
    /// Not yet started.
    Pending,
    /// A worker is currently running it.
    InProgress,
    /// Finished; results are trusted on resume.
    Complete,
    /// The match errored; carried in the manifest, not re-run.
    Error,
}

/// A scheduled match in the league.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    /// Stable fixture identifier (no random suffix).
    pub fixture_id: String,
    /// Event name.
    pub event: String,
    /// Models seated, in config order.
    pub models: Vec<String>,
    /// Global 1-based match counter, used for seed derivation.
    pub match_number: u32,
    /// Round number (multi-player events schedule several rounds).
    #[serde(default = "default_round")]
    pub round: u32,
    /// Match id, set when the fixture starts.
    pub match_id: Option<String>,
    /// Lifecycle status.
    pub status: FixtureStatus,
    /// Final scores per player slot.
    #[serde(default)]
    pub scores: HashMap<String, f64>,
    /// Player slot → model name.
    #[serde(default)]
    pub player_models: HashMap<String, String>,
    /// Per-player violation summary.
    #[serde(default)]
    pub fidelity: HashMap<String, FidelityReport>,
    /// Error text when status is `error`.
    pub error: Option<String>,
}

fn default_round() -> u32 {
    1
}

/// One row of a league table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandingsEntry {
    /// Model name.
    pub model: String,
    /// Fixtures played.
    pub played: u32,
    /// Wins (2-player series only).
    #[serde(rename = "W")]
    pub wins: u32,
    /// Draws.
    #[serde(rename = "D")]
    pub draws: u32,
    /// Losses.
    #[serde(rename = "L")]
    pub losses: u32,
    /// Sum of own scores.
    pub points_for: f64,
    /// Sum of opponent scores (2-player series only).
    pub points_against: f64,
    /// 3/1/0 or positional league points.
    pub league_points: f64,
}

impl StandingsEntry {
    /// Points-for minus points-against, the first tiebreaker.
    pub fn differential(&self) -> f64 {
        self.points_for - self.points_against
    }
}

/// Durable snapshot of the league state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueManifest {
    /// Tournament name.
    pub tournament_name: String,
    /// Always `league`.
    pub format: String,
    /// Competing models in config order.
    pub models: Vec<String>,
    /// Event names in config order.
    pub events: Vec<String>,
    /// Fixture count.
    pub total_fixtures: usize,
    /// Completed fixture count.
    pub completed_fixtures: usize,
    /// `in_progress` until every fixture completes.
    pub status: String,
    /// All fixtures.
    pub fixtures: Vec<Fixture>,
    /// Per-event league tables.
    pub standings: BTreeMap<String, Vec<StandingsEntry>>,
}

/// Convert a 2-player series result to 3/1/0 league points.
pub fn series_to_league_points(
    scores: &HashMap<String, f64>,
    player_models: &HashMap<String, String>,
) -> HashMap<String, f64> {
    let mut pids: Vec<&String> = player_models.keys().collect();
    pids.sort();
    let (Some(pid_a), Some(pid_b)) = (pids.first(), pids.get(1)) else {
        return HashMap::new();
    };
    let score_a = scores.get(*pid_a).copied().unwrap_or(0.0);
    let score_b = scores.get(*pid_b).copied().unwrap_or(0.0);
    let model_a = player_models[*pid_a].clone();
    let model_b = player_models[*pid_b].clone();

    if score_a > score_b {
        HashMap::from([(model_a, 3.0), (model_b, 0.0)])
    } else if score_b > score_a {
        HashMap::from([(model_a, 0.0), (model_b, 3.0)])
    } else {
        HashMap::from([(model_a, 1.0), (model_b, 1.0)])
    }
}

/// Positional scoring for N-player fixtures: position `k` (0-indexed
/// by score descending) earns `N - k` points; tied players share the
/// average of the rank points they occupy.
pub fn multiplayer_positional_points(
    scores: &HashMap<String, f64>,
    player_models: &HashMap<String, String>,
) -> HashMap<String, f64> {
    let n = player_models.len();
    let mut ranked: Vec<(&String, f64)> = player_models
        .keys()
        .map(|pid| (pid, scores.get(pid).copied().unwrap_or(0.0)))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });

    let mut result = HashMap::new();
    let mut i = 0;
    while i < ranked.len() {
        let mut j = i;
        while j < ranked.len() && ranked[j].1 == ranked[i].1 {
            j += 1;
        }
        let avg = (i..j).map(|k| (n - k) as f64).sum::<f64>() / (j - i) as f64;
        for (pid, _) in &ranked[i..j] {
            result.insert(player_models[*pid].clone(), avg);
        }
        i = j;
    }
    result
}

/// Compute a league table from the completed fixtures.
///
/// Sort order: league points desc, then points differential desc,
/// then wins desc; equal entries keep config order.
pub fn compute_standings(
    fixtures: &[Fixture],
    model_names: &[String],
    event: Option<&str>,
    is_multiplayer: bool,
) -> Vec<StandingsEntry> {
    let mut entries: Vec<StandingsEntry> = model_names
        .iter()
        .map(|m| StandingsEntry {
            model: m.clone(),
            ..Default::default()
        })
        .collect();
    let index: HashMap<&str, usize> = model_names
        .iter()
        .enumerate()
        .map(|(i, m)| (m.as_str(), i))
        .collect();

    for fix in fixtures {
        if fix.status != FixtureStatus::Complete {
            continue;
        }
        if let Some(event) = event {
            if fix.event != event {
                continue;
            }
        }

        let points = if is_multiplayer {
            multiplayer_positional_points(&fix.scores, &fix.player_models)
        } else {
            series_to_league_points(&fix.scores, &fix.player_models)
        };

        for model in fix.player_models.values() {
            if let Some(&i) = index.get(model.as_str()) {
                entries[i].played += 1;
            }
        }

        if !is_multiplayer && fix.player_models.len() == 2 {
            let mut pids: Vec<&String> = fix.player_models.keys().collect();
            pids.sort();
            let (pid_a, pid_b) = (pids[0], pids[1]);
            let score_a = fix.scores.get(pid_a).copied().unwrap_or(0.0);
            let score_b = fix.scores.get(pid_b).copied().unwrap_or(0.0);
            let ia = index.get(fix.player_models[pid_a].as_str()).copied();
            let ib = index.get(fix.player_models[pid_b].as_str()).copied();
            if let (Some(ia), Some(ib)) = (ia, ib) {
                if score_a > score_b {
                    entries[ia].wins += 1;
                    entries[ib].losses += 1;
                } else if score_b > score_a {
                    entries[ib].wins += 1;
                    entries[ia].losses += 1;
                } else {
                    entries[ia].draws += 1;
                    entries[ib].draws += 1;
                }
                entries[ia].points_for += score_a;
                entries[ia].points_against += score_b;
                entries[ib].points_for += score_b;
                entries[ib].points_against += score_a;
            }
        } else {
            for (pid, model) in &fix.player_models {
                if let Some(&i) = index.get(model.as_str()) {
                    entries[i].points_for += fix.scores.get(pid).copied().unwrap_or(0.0);
                }
            }
        }

        for (model, pts) in points {
            if let Some(&i) = index.get(model.as_str()) {
                entries[i].league_points += pts;
            }
        }
    }

    entries.sort_by(|a, b| {
        b.league_points
            .partial_cmp(&a.league_points)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.differential()
                    .partial_cmp(&a.differential())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| b.wins.cmp(&a.wins))
    });
    entries
}

struct Shared {
    engine: Arc<TournamentEngine>,
    manifest_path: PathBuf,
    fixtures: Mutex<Vec<Fixture>>,
}

impl Shared {
    fn build_manifest(&self, fixtures: &[Fixture]) -> LeagueManifest {
        let config = self.engine.config();
        let model_names = config.model_names();
        let n_models = model_names.len();

        let mut standings = BTreeMap::new();
        for event in &config.events {
            let is_mp = event.is_multiplayer() && n_models > 2;
            standings.insert(
                event.name.clone(),
                compute_standings(fixtures, &model_names, Some(&event.name), is_mp),
            );
        }

        let total = fixtures.len();
        let complete = fixtures
            .iter()
            .filter(|f| f.status == FixtureStatus::Complete)
            .count();
        LeagueManifest {
            tournament_name: config.name.clone(),
            format: "league".to_string(),
            models: model_names,
            events: config.events.iter().map(|e| e.name.clone()).collect(),
            total_fixtures: total,
            completed_fixtures: complete,
            status: if complete == total {
                "complete".to_string()
            } else {
                "in_progress".to_string()
            },
            fixtures: fixtures.to_vec(),
            standings,
        }
    }

    /// Caller must hold the fixtures lock; that lock is what serializes
    /// manifest writes.
    fn write_manifest(&self, fixtures: &[Fixture]) -> anyhow::Result<()> {
        manifest::write_atomic(&self.manifest_path, &self.build_manifest(fixtures))
    }
}

/// Runs a round-robin league tournament with resumability.
pub struct LeagueRunner {
    shared: Arc<Shared>,
}

impl LeagueRunner {
    /// Load the existing manifest (if any) or generate fresh fixtures.
    pub fn new(engine: Arc<TournamentEngine>) -> anyhow::Result<Self> {
        let manifest_path = engine
            .telemetry_dir()
            .join(format!("league-{}.json", engine.config().name));

        let fixtures = if manifest_path.exists() {
            let loaded: LeagueManifest = manifest::read(&manifest_path)?;
            let mut fixtures = loaded.fixtures;
            let mut resumed = 0;
            for fix in &mut fixtures {
                // A fixture caught mid-flight belonged to a crashed run.
                if fix.status == FixtureStatus::InProgress {
                    fix.status = FixtureStatus::Pending;
                    fix.match_id = None;
                }
                if fix.status == FixtureStatus::Complete {
                    resumed += 1;
                }
            }
            info!(resumed, total = fixtures.len(), "resumed from manifest");
            println!("Resumed from manifest: {resumed}/{} complete", fixtures.len());
            fixtures
        } else {
            generate_fixtures(&engine)
        };

        Ok(Self {
            shared: Arc::new(Shared {
                engine,
                manifest_path,
                fixtures: Mutex::new(fixtures),
            }),
        })
    }

    /// Path of the league manifest.
    pub fn manifest_path(&self) -> &std::path::Path {
        &self.shared.manifest_path
    }

    /// Snapshot of the current fixtures.
    pub fn fixtures(&self) -> Vec<Fixture> {
        self.shared.fixtures.lock().expect("poisoned").clone()
    }

    /// Execute all pending fixtures, parallelized by event.
    pub fn run(&mut self) -> anyhow::Result<LeagueManifest> {
        let config = self.shared.engine.config().clone();
        let (total, complete, pending) = {
            let fixtures = self.shared.fixtures.lock().expect("poisoned");
            let complete = fixtures
                .iter()
                .filter(|f| f.status == FixtureStatus::Complete)
                .count();
            let pending = fixtures
                .iter()
                .filter(|f| f.status == FixtureStatus::Pending)
                .count();
            (fixtures.len(), complete, pending)
        };

        println!("League: {}", config.name);
        println!("Fixtures: {total} total, {complete} complete, {pending} pending");
        println!();

        if pending == 0 {
            println!("All fixtures complete.");
            self.print_standings();
            let fixtures = self.shared.fixtures.lock().expect("poisoned");
            return Ok(self.shared.build_manifest(&fixtures));
        }

        // Group pending fixture indices by event.
        let mut by_event: Vec<(String, Vec<usize>)> = Vec::new();
        {
            let fixtures = self.shared.fixtures.lock().expect("poisoned");
            self.shared.write_manifest(&fixtures)?;
            for (i, fix) in fixtures.iter().enumerate() {
                if matches!(fix.status, FixtureStatus::Complete | FixtureStatus::Error) {
                    continue;
                }
                match by_event.iter_mut().find(|(e, _)| *e == fix.event) {
                    Some((_, list)) => list.push(i),
                    None => by_event.push((fix.event.clone(), vec![i])),
                }
            }
        }

        let event_names: Vec<String> = by_event.iter().map(|(e, _)| e.clone()).collect();
        println!(
            "Running {} events in parallel: {}",
            event_names.len(),
            event_names.join(", ")
        );
        println!();

        let mut workers = Vec::new();
        for (event_name, indices) in by_event {
            let shared = self.shared.clone();
            let worker = std::thread::Builder::new()
                .name(format!("league-{event_name}"))
                .spawn(move || run_event_fixtures(&shared, &event_name, &indices))
                .context("could not spawn event worker thread")?;
            workers.push(worker);
        }
        for worker in workers {
            match worker.join() {
                Ok(result) => result?,
                Err(_) => anyhow::bail!("an event worker thread panicked"),
            }
        }

        self.print_standings();
        let fixtures = self.shared.fixtures.lock().expect("poisoned");
        Ok(self.shared.build_manifest(&fixtures))
    }

    /// Print formatted league tables to stdout.
    pub fn print_standings(&self) {
        let config = self.shared.engine.config();
        let model_names = config.model_names();
        let fixtures = self.fixtures();
        for event in &config.events {
            let is_mp = event.is_multiplayer() && model_names.len() > 2;
            let standings = compute_standings(&fixtures, &model_names, Some(&event.name), is_mp);

            println!("\n{}", "=".repeat(60));
            println!("  {} STANDINGS", event.name.to_uppercase());
            println!("{}", "=".repeat(60));

            if is_mp {
                println!("  {:<25} {:>3} {:>6}", "Model", "P", "Pts");
                println!("  {} {} {}", "-".repeat(25), "-".repeat(3), "-".repeat(6));
                for e in &standings {
                    println!("  {:<25} {:>3} {:>6.1}", e.model, e.played, e.league_points);
                }
            } else {
                println!(
                    "  {:<25} {:>3} {:>3} {:>3} {:>3} {:>6} {:>6} {:>6}",
                    "Model", "P", "W", "D", "L", "PF", "PA", "Pts"
                );
                println!(
                    "  {} {} {} {} {} {} {} {}",
                    "-".repeat(25),
                    "-".repeat(3),
                    "-".repeat(3),
                    "-".repeat(3),
                    "-".repeat(3),
                    "-".repeat(6),
                    "-".repeat(6),
                    "-".repeat(6)
                );
                for e in &standings {
                    println!(
                        "  {:<25} {:>3} {:>3} {:>3} {:>3} {:>6.1} {:>6.1} {:>6.1}",
                        e.model,
                        e.played,
                        e.wins,
                        e.draws,
                        e.losses,
                        e.points_for,
                        e.points_against,
                        e.league_points
                    );
                }
            }
        }
        println!();
    }
}

/// Build the flat fixture list: one fixture per unordered model pair
/// for 2-player events, `rounds` all-model fixtures for multi-player
/// events. Order follows config order throughout.
fn generate_fixtures(engine: &TournamentEngine) -> Vec<Fixture> {
    let config = engine.config();
    let model_names = config.model_names();
    let mut fixtures = Vec::new();
    let mut match_number = 0;

    for event in &config.events {
        let is_mp = event.is_multiplayer() && model_names.len() > 2;
        if is_mp {
            for round in 1..=event.rounds {
                match_number += 1;
                fixtures.push(Fixture {
                    fixture_id: format!("{}-round-{round}", event.name),
                    event: event.name.clone(),
                    models: model_names.clone(),
                    match_number,
                    round,
                    match_id: None,
                    status: FixtureStatus::Pending,
                    scores: HashMap::new(),
                    player_models: HashMap::new(),
                    fidelity: HashMap::new(),
                    error: None,
                });
            }
        } else {
            for i in 0..model_names.len() {
                for j in (i + 1)..model_names.len() {
                    match_number += 1;
                    fixtures.push(Fixture {
                        fixture_id: format!(
                            "{}-{}-vs-{}",
                            event.name, model_names[i], model_names[j]
                        ),
                        event: event.name.clone(),
                        models: vec![model_names[i].clone(), model_names[j].clone()],
                        match_number,
                        round: 1,
                        match_id: None,
                        status: FixtureStatus::Pending,
                        scores: HashMap::new(),
                        player_models: HashMap::new(),
                        fidelity: HashMap::new(),
                        error: None,
                    });
                }
            }
        }
    }
    fixtures
}

/// Run all of one event's fixtures sequentially (worker thread body).
///
/// Match failures mark the fixture `error` and the worker moves on;
/// manifest write failures are fatal and propagate.
fn run_event_fixtures(shared: &Shared, event_name: &str, indices: &[usize]) -> anyhow::Result<()> {
    let event_cfg = shared
        .engine
        .config()
        .event(event_name)
        .with_context(|| format!("unknown event {event_name}"))?
        .clone();
    let total = indices.len();

    for (position, &idx) in indices.iter().enumerate() {
        let (models, match_id, round, match_number, fixture_id) = {
            let mut fixtures = shared.fixtures.lock().expect("poisoned");
            let fix = &mut fixtures[idx];
            if matches!(fix.status, FixtureStatus::Complete | FixtureStatus::Error) {
                continue;
            }
            let suffix = shared
                .engine
                .match_suffix(&fix.event, fix.round, fix.match_number);
            let match_id = format!("{}-{suffix}", fix.fixture_id);
            fix.status = FixtureStatus::InProgress;
            fix.match_id = Some(match_id.clone());
            let snapshot = (
                fix.models.clone(),
                match_id,
                fix.round,
                fix.match_number,
                fix.fixture_id.clone(),
            );
            shared.write_manifest(&fixtures)?;
            snapshot
        };

        let label = if models.len() <= 4 {
            models.join(" vs ")
        } else {
            format!("{} models", models.len())
        };
        println!("[{event_name} {}/{total}] {label}", position + 1);

        let result = shared
            .engine
            .run_match(&event_cfg, &models, &match_id, round, match_number);

        let mut fixtures = shared.fixtures.lock().expect("poisoned");
        let fix = &mut fixtures[idx];
        match result {
            Ok(outcome) => {
                fix.status = FixtureStatus::Complete;
                fix.scores = outcome.scores.clone();
                fix.player_models = outcome.player_models.clone();
                fix.fidelity = outcome.fidelity.clone();

                let mut ranked: Vec<(&String, f64)> = outcome
                    .player_models
                    .keys()
                    .map(|pid| (pid, outcome.scores.get(pid).copied().unwrap_or(0.0)))
                    .collect();
                ranked.sort_by(|a, b| {
                    b.1.partial_cmp(&a.1)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.0.cmp(b.0))
                });
                println!("[{event_name} {}/{total}] DONE", position + 1);
                for (pid, score) in ranked {
                    println!("  {:<20} {score:>6.1}", outcome.player_models[pid]);
                }
            }
            Err(e) => {
                warn!(fixture = %fixture_id, "fixture failed: {e:#}");
                println!("[{event_name} {}/{total}] ERROR: {e:#}", position + 1);
                fix.status = FixtureStatus::Error;
                fix.error = Some(format!("{e:#}"));
            }
        }
        shared.write_manifest(&fixtures)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(event: &str, a: &str, b: &str, score_a: f64, score_b: f64) -> Fixture {
        Fixture {
            fixture_id: format!("{event}-{a}-vs-{b}"),
            event: event.to_string(),
            models: vec![a.to_string(), b.to_string()],
            match_number: 1,
            round: 1,
            match_id: Some("x".to_string()),
            status: FixtureStatus::Complete,
            scores: HashMap::from([
                ("player_a".to_string(), score_a),
                ("player_b".to_string(), score_b),
            ]),
            player_models: HashMap::from([
                ("player_a".to_string(), a.to_string()),
                ("player_b".to_string(), b.to_string()),
            ]),
            fidelity: HashMap::new(),
            error: None,
        }
    }

    #[test]
    fn series_points_win_draw_loss() {
        let scores = HashMap::from([
            ("player_a".to_string(), 120.0),
            ("player_b".to_string(), 80.0),
        ]);
        let models = HashMap::from([
            ("player_a".to_string(), "alpha".to_string()),
            ("player_b".to_string(), "beta".to_string()),
        ]);
        let pts = series_to_league_points(&scores, &models);
        assert_eq!(pts["alpha"], 3.0);
        assert_eq!(pts["beta"], 0.0);

        let tied = HashMap::from([
            ("player_a".to_string(), 100.0),
            ("player_b".to_string(), 100.0),
        ]);
        let pts = series_to_league_points(&tied, &models);
        assert_eq!(pts["alpha"], 1.0);
        assert_eq!(pts["beta"], 1.0);
    }

    #[test]
    fn positional_points_without_ties() {
        let scores = HashMap::from([
            ("player_a".to_string(), 30.0),
            ("player_b".to_string(), 10.0),
            ("player_c".to_string(), 20.0),
        ]);
        let models = HashMap::from([
            ("player_a".to_string(), "alpha".to_string()),
            ("player_b".to_string(), "beta".to_string()),
            ("player_c".to_string(), "gamma".to_string()),
        ]);
        let pts = multiplayer_positional_points(&scores, &models);
        assert_eq!(pts["alpha"], 3.0);
        assert_eq!(pts["gamma"], 2.0);
        assert_eq!(pts["beta"], 1.0);
    }

    #[test]
    fn positional_points_average_over_ties() {
        let scores = HashMap::from([
            ("player_a".to_string(), 30.0),
            ("player_b".to_string(), 30.0),
            ("player_c".to_string(), 10.0),
        ]);
        let models = HashMap::from([
            ("player_a".to_string(), "alpha".to_string()),
            ("player_b".to_string(), "beta".to_string()),
            ("player_c".to_string(), "gamma".to_string()),
        ]);
        let pts = multiplayer_positional_points(&scores, &models);
        // Positions 0 and 1 are tied: (3 + 2) / 2 each.
        assert_eq!(pts["alpha"], 2.5);
        assert_eq!(pts["beta"], 2.5);
        assert_eq!(pts["gamma"], 1.0);
    }

    #[test]
    fn standings_for_three_model_league() {
        // A beats B, A beats C, B draws C.
        let models = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let fixtures = vec![
            fixture("e", "A", "B", 120.0, 80.0),
            fixture("e", "A", "C", 110.0, 90.0),
            fixture("e", "B", "C", 100.0, 100.0),
        ];
        let standings = compute_standings(&fixtures, &models, Some("e"), false);
        assert_eq!(standings[0].model, "A");
        assert_eq!(standings[0].league_points, 6.0);
        assert_eq!(standings[0].wins, 2);
        assert_eq!(standings[1].league_points, 1.0);
        assert_eq!(standings[2].league_points, 1.0);
        // B and C are tied on points and differential; config order holds.
        assert_eq!(standings[1].model, "B");
        assert_eq!(standings[2].model, "C");
    }

    #[test]
    fn standings_tiebreak_by_differential() {
        let models = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let fixtures = vec![
            fixture("e", "A", "B", 150.0, 50.0),
            fixture("e", "B", "C", 120.0, 80.0),
            fixture("e", "C", "A", 120.0, 80.0),
        ];
        // Everyone has one win: A diff +60, B diff -60, C diff 0.
        let standings = compute_standings(&fixtures, &models, Some("e"), false);
        assert_eq!(standings[0].model, "A");
        assert_eq!(standings[1].model, "C");
        assert_eq!(standings[2].model, "B");
    }

    #[test]
    fn incomplete_fixtures_ignored() {
        let models = vec!["A".to_string(), "B".to_string()];
        let mut fix = fixture("e", "A", "B", 120.0, 80.0);
        fix.status = FixtureStatus::Pending;
        let standings = compute_standings(&[fix], &models, Some("e"), false);
        assert_eq!(standings[0].played, 0);
        assert_eq!(standings[0].league_points, 0.0);
    }

    #[test]
    fn fixture_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&FixtureStatus::InProgress).unwrap(),
            r#""in_progress""#
        );
        let status: FixtureStatus = serde_json::from_str(r#""pending""#).unwrap();
        assert_eq!(status, FixtureStatus::Pending);
    }
}
