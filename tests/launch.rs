//! End-to-end tournament runs against mock adapters.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use llm_tournament::adapter::{AdapterErrorKind, ModelAdapter};
use llm_tournament::bracket::BracketRunner;
use llm_tournament::configuration::TournamentFormat;
use llm_tournament::games::BuiltinGameFactory;
use llm_tournament::league::{FixtureStatus, LeagueRunner};
use llm_tournament::referee::RefereeConfig;
use llm_tournament::tournament::TournamentEngine;

use crate::games::{
    bidder, config, duel_event, high_card_event, mock_model, read_jsonl, FailingAdapter,
    ScriptedDuelFactory,
};


#[test]
fn bracket_of_four_favorites_always_win() {
    let dir = tempfile::tempdir().unwrap();
    let models = vec![
        mock_model("m-1", "hold"),
        mock_model("m-2", "hold"),
        mock_model("m-3", "hold"),
        mock_model("m-4", "hold"),
    ];
    let cfg = config(
        "s1-bracket-test",
        42,
        TournamentFormat::Bracket,
        models,
        vec![duel_event("duel")],
        dir.path(),
    );
    // Lower seed number always bids higher, so favorites always win.
    let adapters: HashMap<String, Arc<dyn ModelAdapter>> = (1..=4)
        .map(|k| (format!("m-{k}"), bidder(&format!("m-{k}"), 5 - k as i64)))
        .collect();
    let engine = Arc::new(
        TournamentEngine::with_adapters(cfg, Arc::new(ScriptedDuelFactory), adapters).unwrap(),
    );

    let mut runner = BracketRunner::new(engine.clone()).unwrap();
    let manifest = runner.run().unwrap();

    assert_eq!(manifest.num_rounds, 2);
    assert_eq!(manifest.status, "complete");
    assert_eq!(manifest.champion.as_deref(), Some("m-1"));

    // Round r holds exactly n / 2^r matches.
    assert_eq!(manifest.rounds[0].matches.len(), 2);
    assert_eq!(manifest.rounds[1].matches.len(), 1);
    for round in &manifest.rounds {
        assert_eq!(round.status, "complete");
    }

    // Round 1 pairs (1,4) and (2,3); the final pairs the favorites.
    let r1 = &manifest.rounds[0].matches;
    assert_eq!((r1[0].model_a.as_str(), r1[0].model_b.as_str()), ("m-1", "m-4"));
    assert_eq!((r1[1].model_a.as_str(), r1[1].model_b.as_str()), ("m-2", "m-3"));
    let fin = &manifest.rounds[1].matches[0];
    assert_eq!((fin.model_a.as_str(), fin.model_b.as_str()), ("m-1", "m-2"));
    assert_eq!(fin.winner.as_deref(), Some("m-1"));

    // The champion won a match in every round.
    for round in &manifest.rounds {
        assert!(round
            .matches
            .iter()
            .any(|m| m.winner.as_deref() == Some("m-1")));
    }

    // Each match has its telemetry file, ending with a summary line.
    for round in &manifest.rounds {
        for m in &round.matches {
            let path = engine
                .telemetry_dir()
                .join(format!("{}.jsonl", m.match_id.as_ref().unwrap()));
            let records = read_jsonl(&path);
            assert_eq!(
                records.last().unwrap()["record_type"],
                "match_summary",
                "{path:?}"
            );
        }
    }
}

#[test]
fn bracket_of_two_is_one_round_one_match() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(
        "tiny-bracket",
        7,
        TournamentFormat::Bracket,
        vec![mock_model("m-1", "hold"), mock_model("m-2", "hold")],
        vec![duel_event("duel")],
        dir.path(),
    );
    let adapters: HashMap<String, Arc<dyn ModelAdapter>> = HashMap::from([
        ("m-1".to_string(), bidder("m-1", 2)),
        ("m-2".to_string(), bidder("m-2", 1)),
    ]);
    let engine = Arc::new(
        TournamentEngine::with_adapters(cfg, Arc::new(ScriptedDuelFactory), adapters).unwrap(),
    );
    let manifest = BracketRunner::new(engine).unwrap().run().unwrap();
    assert_eq!(manifest.num_rounds, 1);
    assert_eq!(manifest.rounds.len(), 1);
    assert_eq!(manifest.rounds[0].matches.len(), 1);
    assert_eq!(manifest.rounds[0].label, "FINAL");
    assert_eq!(manifest.champion.as_deref(), Some("m-1"));
}

#[test]
fn bracket_rejects_bad_configs() {
    let dir = tempfile::tempdir().unwrap();
    // Three models is not a power of two.
    let cfg = config(
        "bad-count",
        1,
        TournamentFormat::Bracket,
        vec![
            mock_model("a", "hold"),
            mock_model("b", "hold"),
            mock_model("c", "hold"),
        ],
        vec![duel_event("duel")],
        dir.path(),
    );
    let engine = Arc::new(
        TournamentEngine::new(cfg, Arc::new(ScriptedDuelFactory)).unwrap(),
    );
    assert!(BracketRunner::new(engine).is_err());

    // Two events is one too many for a bracket.
    let cfg = config(
        "bad-events",
        1,
        TournamentFormat::Bracket,
        vec![mock_model("a", "hold"), mock_model("b", "hold")],
        vec![duel_event("duel"), duel_event("duel2")],
        dir.path(),
    );
    let engine = Arc::new(
        TournamentEngine::new(cfg, Arc::new(ScriptedDuelFactory)).unwrap(),
    );
    assert!(BracketRunner::new(engine).is_err());
}

#[test]
fn league_of_three_computes_standings() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(
        "s1-league-test",
        42,
        TournamentFormat::League,
        vec![
            mock_model("A", "hold"),
            mock_model("B", "hold"),
            mock_model("C", "hold"),
        ],
        vec![duel_event("duel")],
        dir.path(),
    );
    // A beats everyone; B and C draw each other.
    let adapters: HashMap<String, Arc<dyn ModelAdapter>> = HashMap::from([
        ("A".to_string(), bidder("A", 3)),
        ("B".to_string(), bidder("B", 1)),
        ("C".to_string(), bidder("C", 1)),
    ]);
    let engine = Arc::new(
        TournamentEngine::with_adapters(cfg, Arc::new(ScriptedDuelFactory), adapters).unwrap(),
    );
    let manifest = LeagueRunner::new(engine).unwrap().run().unwrap();

    // C(3,2) = 3 fixtures, in config order.
    assert_eq!(manifest.total_fixtures, 3);
    assert_eq!(manifest.completed_fixtures, 3);
    assert_eq!(manifest.status, "complete");
    let ids: Vec<&str> = manifest
        .fixtures
        .iter()
        .map(|f| f.fixture_id.as_str())
        .collect();
    assert_eq!(ids, vec!["duel-A-vs-B", "duel-A-vs-C", "duel-B-vs-C"]);

    let standings = &manifest.standings["duel"];
    assert_eq!(standings[0].model, "A");
    assert_eq!(standings[0].league_points, 6.0);
    assert_eq!(standings[0].wins, 2);
    assert_eq!(standings[1].league_points, 1.0);
    assert_eq!(standings[2].league_points, 1.0);
    assert_eq!(standings[1].draws, 1);
    // Status partition invariant.
    let complete = manifest
        .fixtures
        .iter()
        .filter(|f| f.status == FixtureStatus::Complete)
        .count();
    assert_eq!(complete, manifest.total_fixtures);
}

#[test]
fn league_high_card_with_builtin_factory() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(
        "s1-league-bantam",
        11,
        TournamentFormat::League,
        vec![
            mock_model("rock", "hold"),
            mock_model("mouse", "fold"),
            mock_model("waffler", "self_correct"),
        ],
        vec![high_card_event(10, 100, 2)],
        dir.path(),
    );
    let engine = Arc::new(TournamentEngine::new(cfg, Arc::new(BuiltinGameFactory)).unwrap());
    let manifest = LeagueRunner::new(engine.clone()).unwrap().run().unwrap();

    assert_eq!(manifest.completed_fixtures, 3);

    // Chip conservation per completed fixture.
    for fix in &manifest.fixtures {
        let total: f64 = fix.scores.values().sum();
        assert_eq!(total, 200.0, "fixture {}", fix.fixture_id);
    }

    // The always-holder beats the always-folder.
    let standings = &manifest.standings["high_card"];
    assert_eq!(standings[0].model, "rock");

    // Last-wins parsing: the self-corrector's final action is fold.
    let waffle_fixture = manifest
        .fixtures
        .iter()
        .find(|f| f.fixture_id.contains("waffler"))
        .unwrap();
    let path = engine
        .telemetry_dir()
        .join(format!("{}.jsonl", waffle_fixture.match_id.as_ref().unwrap()));
    let records = read_jsonl(&path);
    let waffler_turns: Vec<_> = records
        .iter()
        .filter(|r| {
            r["model_id"] == "waffler" && r.get("record_type").is_none()
        })
        .collect();
    assert!(!waffler_turns.is_empty());
    for turn in waffler_turns {
        assert_eq!(turn["parsed_action"]["action"], "fold");
        assert_eq!(turn["parse_success"], true);
    }
}

#[test]
fn timeout_escalates_to_turn_forfeit() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(
        "escalation-test",
        5,
        TournamentFormat::League,
        vec![mock_model("steady", "hold"), mock_model("flaky", "hold")],
        vec![duel_event("duel")],
        dir.path(),
    );
    cfg.referee = RefereeConfig {
        strike_violations: vec![llm_tournament::referee::ViolationKind::Timeout],
        turn_forfeit_threshold: 1,
        match_forfeit_threshold: 10,
        ..Default::default()
    };
    let adapters: HashMap<String, Arc<dyn ModelAdapter>> = HashMap::from([
        ("steady".to_string(), bidder("steady", 3)),
        (
            "flaky".to_string(),
            Arc::new(FailingAdapter {
                model_id: "flaky".to_string(),
                kind: AdapterErrorKind::Timeout,
            }) as Arc<dyn ModelAdapter>,
        ),
    ]);
    let engine = Arc::new(
        TournamentEngine::with_adapters(cfg, Arc::new(ScriptedDuelFactory), adapters).unwrap(),
    );
    let manifest = LeagueRunner::new(engine.clone()).unwrap().run().unwrap();

    let fixture = &manifest.fixtures[0];
    assert_eq!(fixture.status, FixtureStatus::Complete);
    // The flaky model's turn was forfeited to the default bid.
    let flaky_slot = fixture
        .player_models
        .iter()
        .find(|(_, m)| m.as_str() == "flaky")
        .map(|(pid, _)| pid.clone())
        .unwrap();
    assert_eq!(fixture.scores[&flaky_slot], 0.0);
    assert_eq!(fixture.fidelity[&flaky_slot].timeout, 2);

    let path = engine
        .telemetry_dir()
        .join(format!("{}.jsonl", fixture.match_id.as_ref().unwrap()));
    let records = read_jsonl(&path);
    let flaky_records: Vec<_> = records
        .iter()
        .filter(|r| r["player_id"] == flaky_slot.as_str() && r.get("record_type").is_none())
        .collect();
    assert_eq!(flaky_records.len(), 2);
    assert_eq!(flaky_records[0]["violation"], "timeout");
    assert_eq!(flaky_records[0]["ruling"], "retry");
    assert_eq!(flaky_records[1]["violation"], "timeout");
    assert_eq!(flaky_records[1]["ruling"], "forfeit_turn");
}

#[test]
fn three_player_elimination_creates_dead_seat() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(
        "elimination-test",
        3,
        TournamentFormat::League,
        vec![
            mock_model("A", "hold"),
            mock_model("B", "hold"),
            mock_model("C", "hold"),
        ],
        vec![high_card_event(10, 100, 3)],
        dir.path(),
    );
    cfg.referee = RefereeConfig {
        strike_violations: vec![llm_tournament::referee::ViolationKind::Timeout],
        turn_forfeit_threshold: 1,
        match_forfeit_threshold: 2,
        ..Default::default()
    };
    let adapters: HashMap<String, Arc<dyn ModelAdapter>> = HashMap::from([
        ("A".to_string(), bidder_hold("A")),
        (
            "B".to_string(),
            Arc::new(FailingAdapter {
                model_id: "B".to_string(),
                kind: AdapterErrorKind::Timeout,
            }) as Arc<dyn ModelAdapter>,
        ),
        ("C".to_string(), bidder_hold("C")),
    ]);
    let engine = Arc::new(
        TournamentEngine::with_adapters(cfg, Arc::new(BuiltinGameFactory), adapters).unwrap(),
    );
    let manifest = LeagueRunner::new(engine.clone()).unwrap().run().unwrap();

    // One multiplayer fixture seating all three models.
    assert_eq!(manifest.total_fixtures, 1);
    let fixture = &manifest.fixtures[0];
    assert_eq!(fixture.fixture_id, "high_card-round-1");
    assert_eq!(fixture.status, FixtureStatus::Complete);
    assert_eq!(fixture.models.len(), 3);

    // Chips stay conserved even with a dead seat posting antes.
    assert_eq!(fixture.scores.values().sum::<f64>(), 300.0);
    // The dead seat kept paying antes and never won a pot.
    assert_eq!(fixture.scores["player_b"], 90.0);

    let path = engine
        .telemetry_dir()
        .join(format!("{}.jsonl", fixture.match_id.as_ref().unwrap()));
    let records = read_jsonl(&path);
    let elimination_index = records
        .iter()
        .position(|r| r["ruling"] == "eliminate_player")
        .expect("player B should be eliminated");
    assert_eq!(records[elimination_index]["player_id"], "player_b");
    // After the elimination, the dead seat is never asked to act again.
    for record in &records[elimination_index + 1..] {
        if record.get("record_type").is_none() {
            assert_ne!(record["player_id"], "player_b");
        }
    }
}

#[test]
fn league_resumes_only_pending_fixtures() {
    let dir = tempfile::tempdir().unwrap();
    let make_engine = || {
        let cfg = config(
            "resume-test",
            21,
            TournamentFormat::League,
            vec![
                mock_model("A", "hold"),
                mock_model("B", "fold"),
                mock_model("C", "hold"),
            ],
            vec![high_card_event(5, 50, 2)],
            dir.path(),
        );
        Arc::new(TournamentEngine::new(cfg, Arc::new(BuiltinGameFactory)).unwrap())
    };

    // Uninterrupted run.
    let engine = make_engine();
    let reference = LeagueRunner::new(engine).unwrap().run().unwrap();
    let reference_ids: HashSet<String> = reference
        .fixtures
        .iter()
        .map(|f| f.fixture_id.clone())
        .collect();
    let manifest_path = dir
        .path()
        .join("telemetry")
        .join("league-resume-test.json");

    // Simulate a crash: one fixture caught in flight, one not started.
    let mut doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&manifest_path).unwrap()).unwrap();
    doc["fixtures"][0]["status"] = "in_progress".into();
    doc["fixtures"][1]["status"] = "pending".into();
    doc["fixtures"][1]["match_id"] = serde_json::Value::Null;
    std::fs::write(&manifest_path, serde_json::to_string(&doc).unwrap()).unwrap();

    // On load, the in-flight fixture is reset and its match id cleared.
    let runner = LeagueRunner::new(make_engine()).unwrap();
    let fixtures = runner.fixtures();
    assert_eq!(fixtures[0].status, FixtureStatus::Pending);
    assert!(fixtures[0].match_id.is_none());
    assert_eq!(fixtures[2].status, FixtureStatus::Complete);

    // Re-running completes only what was pending; the completed set
    // matches the uninterrupted run.
    let mut runner = runner;
    let resumed = runner.run().unwrap();
    assert_eq!(resumed.completed_fixtures, resumed.total_fixtures);
    let resumed_ids: HashSet<String> = resumed
        .fixtures
        .iter()
        .filter(|f| f.status == FixtureStatus::Complete)
        .map(|f| f.fixture_id.clone())
        .collect();
    assert_eq!(resumed_ids, reference_ids);
}

/// A mock adapter that answers the high-card schema with "hold".
fn bidder_hold(model: &str) -> Arc<dyn ModelAdapter> {
    Arc::new(llm_tournament::adapter::MockAdapter::new(model, |_, _| {
        r#"{"action": "hold"}"#.to_string()
    }))
}
