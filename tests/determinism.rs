//! Reproducibility: identical configs and strategies produce identical
//! telemetry, modulo wall-clock fields.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use llm_tournament::configuration::TournamentFormat;
use llm_tournament::games::BuiltinGameFactory;
use llm_tournament::league::LeagueRunner;
use llm_tournament::tournament::TournamentEngine;

use crate::games::{config, high_card_event, mock_model};


/// All match logs in a telemetry dir, keyed by file name, with the
/// wall-clock fields stripped.
fn stripped_logs(telemetry_dir: &Path) -> BTreeMap<String, Vec<Value>> {
    let mut logs = BTreeMap::new();
    for entry in std::fs::read_dir(telemetry_dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let records: Vec<Value> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|line| {
                let mut record: Value = serde_json::from_str(line).unwrap();
                if let Some(obj) = record.as_object_mut() {
                    obj.remove("timestamp");
                    obj.remove("latency_ms");
                }
                record
            })
            .collect();
        logs.insert(
            path.file_name().unwrap().to_string_lossy().into_owned(),
            records,
        );
    }
    logs
}

fn run_league(output_dir: &Path) {
    let cfg = config(
        "determinism-test",
        1234,
        TournamentFormat::League,
        vec![
            mock_model("rock", "hold"),
            mock_model("mouse", "fold"),
            mock_model("coin", "alternate"),
        ],
        vec![high_card_event(8, 60, 2)],
        output_dir,
    );
    let engine = Arc::new(TournamentEngine::new(cfg, Arc::new(BuiltinGameFactory)).unwrap());
    LeagueRunner::new(engine).unwrap().run().unwrap();
}

#[test]
fn two_runs_produce_identical_turn_sequences() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    run_league(dir_a.path());
    run_league(dir_b.path());

    let logs_a = stripped_logs(&dir_a.path().join("telemetry"));
    let logs_b = stripped_logs(&dir_b.path().join("telemetry"));

    // Deterministic match-id suffixes: the very file names line up.
    assert_eq!(
        logs_a.keys().collect::<Vec<_>>(),
        logs_b.keys().collect::<Vec<_>>()
    );
    assert!(!logs_a.is_empty());

    for (name, records_a) in &logs_a {
        let records_b = &logs_b[name];
        assert_eq!(records_a, records_b, "telemetry diverged in {name}");
    }
}

#[test]
fn turn_records_are_in_strict_turn_order() {
    let dir = tempfile::tempdir().unwrap();
    run_league(dir.path());
    let logs = stripped_logs(&dir.path().join("telemetry"));
    for (name, records) in logs {
        let turn_numbers: Vec<u64> = records
            .iter()
            .filter(|r| r.get("record_type").is_none())
            .map(|r| r["turn_number"].as_u64().unwrap())
            .collect();
        let mut sorted = turn_numbers.clone();
        sorted.sort_unstable();
        assert_eq!(turn_numbers, sorted, "out-of-order turns in {name}");
        assert_eq!(
            records.last().unwrap()["record_type"],
            "match_summary",
            "{name} must end with its summary"
        );
    }
}
