//! Per-match JSONL telemetry.
//!
//! One logger per match, writing one line per attempted action plus a
//! final match-summary line. Every line carries `schema_version` and
//! `match_id` and flushes to disk immediately: the file log is the
//! authoritative record. Each write is also forwarded to the async
//! sink when one is configured; sink failures are swallowed.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::referee::FidelityReport;
use crate::sink::SinkHandle;

/// Version of the persisted record layout. Consumers depend on the
/// field names and violation strings; changes bump this.
pub const SCHEMA_VERSION: &str = "1.1.0";

/// Tournament-level context denormalized into every record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TournamentContext {
    /// Tournament name.
    pub tournament_name: String,
    /// Event name (game type).
    pub event_type: String,
    /// Tier label, usually the tournament-name suffix.
    pub tier: String,
    /// Round number within the tournament.
    pub round: u32,
}

/// One attempted action, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Monotonic attempt counter within the match (retries included).
    pub turn_number: u64,
    /// Hand/game counter reported by the engine.
    pub hand_number: u64,
    /// Phase of play reported by the engine.
    pub street: String,
    /// Player slot that was prompted.
    pub player_id: String,
    /// Model occupying the slot.
    pub model_id: String,
    /// Model version the provider reported.
    pub model_version: String,
    /// Full prompt text sent to the model.
    pub prompt: String,
    /// Raw model output (after sanitization).
    pub raw_output: String,
    /// Reasoning/thinking output, when reported.
    pub reasoning_output: Option<String>,
    /// The parsed action object, when parsing succeeded.
    pub parsed_action: Option<Value>,
    /// Whether a schema-valid action was extracted.
    pub parse_success: bool,
    /// Rule-validation outcome ("legal", the rejection reason, or
    /// "n/a" when validation was never reached).
    pub validation_result: String,
    /// Violation kind recorded for this attempt, if any.
    pub violation: Option<String>,
    /// Referee ruling for this attempt, if any.
    pub ruling: Option<String>,
    /// Opaque game-state snapshot.
    pub state_snapshot: Value,
    /// Prompt tokens billed.
    pub input_tokens: u64,
    /// Completion tokens billed.
    pub output_tokens: u64,
    /// Adapter latency for this attempt.
    pub latency_ms: f64,
    /// Engine rules version.
    pub engine_version: String,
    /// Engine prompt wording version.
    pub prompt_version: String,
    /// Shot clock applied to the query, if any.
    pub time_limit_ms: Option<u64>,
    /// True when the adapter latency exceeded the shot clock.
    pub time_exceeded: bool,
    /// Player's cumulative strikes after this attempt.
    pub cumulative_strikes: u32,
    /// Strike threshold that forfeits the match (or eliminates).
    pub strike_limit: Option<u32>,
}

/// Writes JSONL telemetry for a single match.
pub struct TelemetryLogger {
    file: File,
    path: PathBuf,
    match_id: String,
    context: TournamentContext,
    sink: Option<SinkHandle>,
}

impl TelemetryLogger {
    /// Create the per-match log file under `output_dir`.
    pub fn new(
        output_dir: &Path,
        match_id: &str,
        sink: Option<SinkHandle>,
        context: TournamentContext,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("could not create {}", output_dir.display()))?;
        let path = output_dir.join(format!("{match_id}.jsonl"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("could not open {}", path.display()))?;
        Ok(Self {
            file,
            path,
            match_id: match_id.to_string(),
            context,
            sink,
        })
    }

    /// Path of the JSONL file.
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Append one turn record. File errors are fatal.
    pub fn log_turn(&mut self, entry: &TurnRecord) -> anyhow::Result<()> {
        let mut record = serde_json::to_value(entry).context("serialize turn record")?;
        let obj = record
            .as_object_mut()
            .expect("turn record serializes to an object");
        obj.insert("schema_version".into(), SCHEMA_VERSION.into());
        obj.insert("match_id".into(), self.match_id.clone().into());
        obj.insert("timestamp".into(), now_rfc3339().into());
        self.append(&record)?;

        if let Some(sink) = &self.sink {
            sink.log_turn(&self.match_id, entry, &self.context);
        }
        Ok(())
    }

    /// Append the final match-summary record and forward it to the sink.
    pub fn finalize_match(
        &mut self,
        scores: &HashMap<String, f64>,
        fidelity: &HashMap<String, FidelityReport>,
        player_models: &HashMap<String, String>,
        winner: Option<&str>,
    ) -> anyhow::Result<()> {
        let record = serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "record_type": "match_summary",
            "match_id": self.match_id,
            "final_scores": scores,
            "fidelity_report": fidelity,
            "player_models": player_models,
            "winner": winner,
            "engine_version": env!("CARGO_PKG_VERSION"),
            "timestamp": now_rfc3339(),
            "event": self.context.event_type,
            "tournament_name": self.context.tournament_name,
            "tier": self.context.tier,
            "round": self.context.round,
        });
        self.append(&record)?;

        if let Some(sink) = &self.sink {
            sink.finalize_match(&self.match_id, scores, fidelity, player_models, &self.context);
        }
        Ok(())
    }

    fn append(&mut self, record: &Value) -> anyhow::Result<()> {
        let line = serde_json::to_string(record).context("serialize telemetry record")?;
        writeln!(self.file, "{line}")
            .and_then(|()| self.file.flush())
            .with_context(|| format!("could not append to {}", self.path.display()))
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record(turn: u64) -> TurnRecord {
        TurnRecord {
            turn_number: turn,
            hand_number: 1,
            street: "decision".to_string(),
            player_id: "player_a".to_string(),
            model_id: "mock-1".to_string(),
            model_version: "mock-1".to_string(),
            prompt: "state".to_string(),
            raw_output: r#"{"action": "hold"}"#.to_string(),
            reasoning_output: None,
            parsed_action: Some(json!({"action": "hold"})),
            parse_success: true,
            validation_result: "legal".to_string(),
            violation: None,
            ruling: None,
            state_snapshot: json!({"pot": 2}),
            input_tokens: 10,
            output_tokens: 5,
            latency_ms: 1.5,
            engine_version: "1".to_string(),
            prompt_version: "1".to_string(),
            time_limit_ms: Some(30_000),
            time_exceeded: false,
            cumulative_strikes: 0,
            strike_limit: Some(5),
        }
    }

    #[test]
    fn writes_one_line_per_turn_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = TelemetryLogger::new(
            dir.path(),
            "high_card-a-vs-b-abc123",
            None,
            TournamentContext::default(),
        )
        .unwrap();
        logger.log_turn(&sample_record(1)).unwrap();
        logger.log_turn(&sample_record(2)).unwrap();

        let text = std::fs::read_to_string(logger.file_path()).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["turn_number"], 1);
        assert_eq!(lines[1]["turn_number"], 2);
        assert_eq!(lines[0]["schema_version"], SCHEMA_VERSION);
        assert_eq!(lines[0]["match_id"], "high_card-a-vs-b-abc123");
        assert!(lines[0]["timestamp"].is_string());
    }

    #[test]
    fn summary_is_final_line_with_record_type() {
        let dir = tempfile::tempdir().unwrap();
        let context = TournamentContext {
            tournament_name: "s1-league-bantam".to_string(),
            event_type: "high_card".to_string(),
            tier: "bantam".to_string(),
            round: 1,
        };
        let mut logger =
            TelemetryLogger::new(dir.path(), "high_card-a-vs-b-abc123", None, context).unwrap();
        logger.log_turn(&sample_record(1)).unwrap();

        let scores = HashMap::from([
            ("player_a".to_string(), 120.0),
            ("player_b".to_string(), 80.0),
        ]);
        let player_models = HashMap::from([
            ("player_a".to_string(), "alpha".to_string()),
            ("player_b".to_string(), "beta".to_string()),
        ]);
        logger
            .finalize_match(&scores, &HashMap::new(), &player_models, Some("alpha"))
            .unwrap();

        let text = std::fs::read_to_string(logger.file_path()).unwrap();
        let last: Value = serde_json::from_str(text.lines().last().unwrap()).unwrap();
        assert_eq!(last["record_type"], "match_summary");
        assert_eq!(last["final_scores"]["player_a"], 120.0);
        assert_eq!(last["winner"], "alpha");
        assert_eq!(last["tier"], "bantam");
    }
}
