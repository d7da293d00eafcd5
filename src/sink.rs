//! Background writer mirroring telemetry to an external structured
//! store.
//!
//! Producers enqueue denormalized documents on a channel and never
//! block on I/O; a single background thread drains the queue, batches
//! writes, and upserts into postgres. The JSONL file log stays
//! authoritative: a failed connection disables the sink entirely, and
//! a failed batch is logged and discarded.

use std::collections::HashMap;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use postgres::{Client, NoTls};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::model_names::normalize;
use crate::referee::FidelityReport;
use crate::telemetry::{TournamentContext, TurnRecord, SCHEMA_VERSION};

/// Well-known environment variable holding the store connection URI.
pub const DB_URI_ENV: &str = "TOURNEY_DB_URI";

const BATCH_SIZE: usize = 50;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

enum SinkItem {
    Turn(Value),
    Match(Value),
    ModelStat {
        model_id: String,
        event_type: String,
        win: bool,
        draw: bool,
        violations: i64,
    },
    Tournament { name: String, doc: Value },
    Shutdown,
}

/// Cloneable producer side of the sink. Enqueues never block.
#[derive(Clone)]
pub struct SinkHandle {
    tx: Option<mpsc::Sender<SinkItem>>,
    store_prompts: bool,
}

impl SinkHandle {
    fn disabled() -> Self {
        Self {
            tx: None,
            store_prompts: false,
        }
    }

    /// True when the sink dropped into the disabled state.
    pub fn is_disabled(&self) -> bool {
        self.tx.is_none()
    }

    fn send(&self, item: SinkItem) {
        if let Some(tx) = &self.tx {
            // A send error means the worker is gone; the file log still
            // has the data.
            let _ = tx.send(item);
        }
    }

    /// Enqueue one turn document.
    pub fn log_turn(&self, match_id: &str, entry: &TurnRecord, context: &TournamentContext) {
        if self.tx.is_none() {
            return;
        }
        let mut doc = match serde_json::to_value(entry) {
            Ok(v) => v,
            Err(e) => {
                warn!("could not serialize turn for sink: {e}");
                return;
            }
        };
        let obj = doc.as_object_mut().expect("turn record is an object");
        obj.insert("match_id".into(), match_id.into());
        obj.insert("schema_version".into(), SCHEMA_VERSION.into());
        obj.insert("ingest_timestamp".into(), now_rfc3339().into());
        obj.insert("model_id".into(), normalize(&entry.model_id).into());
        obj.insert("model_version".into(), normalize(&entry.model_version).into());

        let ctx = resolve_context(match_id, context);
        obj.insert("event_type".into(), ctx.event_type.clone().into());
        obj.insert("tournament_name".into(), ctx.tournament_name.clone().into());
        obj.insert("tier".into(), ctx.tier.clone().into());
        obj.insert("round".into(), ctx.round.into());

        if !self.store_prompts {
            if let Some(prompt) = obj.remove("prompt") {
                let text = prompt.as_str().unwrap_or_default();
                obj.insert("prompt_hash".into(), sha256_hex(text).into());
                obj.insert("prompt_chars".into(), (text.chars().count() as u64).into());
                obj.insert("prompt_tokens".into(), entry.input_tokens.into());
            }
        }

        self.send(SinkItem::Turn(doc));
    }

    /// Enqueue the match summary and per-model stat updates.
    pub fn finalize_match(
        &self,
        match_id: &str,
        scores: &HashMap<String, f64>,
        fidelity: &HashMap<String, FidelityReport>,
        player_models: &HashMap<String, String>,
        context: &TournamentContext,
    ) {
        if self.tx.is_none() {
            return;
        }
        let player_models: HashMap<String, String> = player_models
            .iter()
            .map(|(k, v)| (k.clone(), normalize(v)))
            .collect();
        let winner = derive_winner(scores, &player_models);
        let ctx = resolve_context(match_id, context);

        let doc = json!({
            "match_id": match_id,
            "schema_version": SCHEMA_VERSION,
            "scores": scores,
            "fidelity": fidelity,
            "player_models": player_models,
            "models": player_models.values().collect::<Vec<_>>(),
            "winner": winner,
            "event_type": ctx.event_type,
            "tournament_name": ctx.tournament_name,
            "tier": ctx.tier,
            "round": ctx.round,
            "ingest_timestamp": now_rfc3339(),
        });
        self.send(SinkItem::Match(doc));

        for (player_id, model_id) in &player_models {
            let is_winner = winner.as_deref() == Some(model_id.as_str());
            let is_draw = winner.is_none();
            let violations = fidelity
                .get(player_id)
                .map(|f| f.total_violations as i64)
                .unwrap_or(0);
            self.send(SinkItem::ModelStat {
                model_id: model_id.clone(),
                event_type: ctx.event_type.clone(),
                win: is_winner,
                draw: is_draw,
                violations,
            });
        }
    }

    /// Enqueue a tournament document upsert.
    pub fn register_tournament(&self, name: &str, doc: Value) {
        self.send(SinkItem::Tournament {
            name: name.to_string(),
            doc,
        });
    }
}

/// Owner of the background writer thread.
///
/// Construct once per tournament and close (or drop) on every exit
/// path so outstanding items get flushed.
pub struct TelemetrySink {
    handle: SinkHandle,
    worker: Option<JoinHandle<()>>,
    // Mutex-wrapped so the sink (and everything holding it) stays Sync.
    done_rx: std::sync::Mutex<Option<mpsc::Receiver<()>>>,
    closed: bool,
}

impl TelemetrySink {
    /// Connect from [`DB_URI_ENV`]. Absent variable or a failed
    /// connection yields a disabled sink.
    pub fn from_env(store_prompts: bool) -> Self {
        match std::env::var(DB_URI_ENV) {
            Ok(uri) => Self::connect(&uri, store_prompts),
            Err(_) => Self::disabled(),
        }
    }

    /// Connect to the store, or disable the sink if the connection
    /// fails. Enqueues on a disabled sink are no-ops.
    pub fn connect(uri: &str, store_prompts: bool) -> Self {
        let mut client = match Client::connect(uri, NoTls) {
            Ok(c) => c,
            Err(e) => {
                warn!("store connection failed, telemetry sink disabled: {e}");
                return Self::disabled();
            }
        };
        if let Err(e) = ensure_schema(&mut client) {
            warn!("store schema setup failed, telemetry sink disabled: {e}");
            return Self::disabled();
        }

        let (tx, rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let worker = std::thread::Builder::new()
            .name("telemetry-sink".to_string())
            .spawn(move || {
                writer_loop(client, rx);
                let _ = done_tx.send(());
            })
            .expect("could not spawn sink worker thread");

        info!("telemetry sink connected");
        Self {
            handle: SinkHandle {
                tx: Some(tx),
                store_prompts,
            },
            worker: Some(worker),
            done_rx: std::sync::Mutex::new(Some(done_rx)),
            closed: false,
        }
    }

    /// A sink that drops everything.
    pub fn disabled() -> Self {
        Self {
            handle: SinkHandle::disabled(),
            worker: None,
            done_rx: std::sync::Mutex::new(None),
            closed: false,
        }
    }

    /// Producer handle for telemetry loggers.
    pub fn handle(&self) -> SinkHandle {
        self.handle.clone()
    }

    /// Send the shutdown sentinel and wait up to 10 s for the worker to
    /// drain the queue.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.handle.send(SinkItem::Shutdown);
        let done_rx = self.done_rx.get_mut().expect("poisoned").take();
        if let Some(done_rx) = done_rx {
            if done_rx.recv_timeout(CLOSE_TIMEOUT).is_err() {
                warn!("telemetry sink did not drain within {CLOSE_TIMEOUT:?}");
            }
        }
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() {
                let _ = worker.join();
            }
        }
    }
}

impl Drop for TelemetrySink {
    fn drop(&mut self) {
        self.close();
    }
}

fn writer_loop(mut client: Client, rx: mpsc::Receiver<SinkItem>) {
    loop {
        let first = match rx.recv_timeout(Duration::from_secs(1)) {
            Ok(SinkItem::Shutdown) => {
                drain_remaining(&mut client, &rx, Vec::new());
                return;
            }
            Ok(item) => item,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        };

        let mut batch = vec![first];
        while batch.len() < BATCH_SIZE {
            match rx.try_recv() {
                Ok(SinkItem::Shutdown) => {
                    drain_remaining(&mut client, &rx, batch);
                    return;
                }
                Ok(item) => batch.push(item),
                Err(_) => break,
            }
        }
        flush_batch(&mut client, batch);
    }
}

fn drain_remaining(client: &mut Client, rx: &mpsc::Receiver<SinkItem>, mut batch: Vec<SinkItem>) {
    while let Ok(item) = rx.try_recv() {
        if !matches!(item, SinkItem::Shutdown) {
            batch.push(item);
        }
    }
    if !batch.is_empty() {
        flush_batch(client, batch);
    }
}

/// Write one batch. A writer error logs a warning and discards the
/// affected group; the sink keeps draining.
fn flush_batch(client: &mut Client, batch: Vec<SinkItem>) {
    for item in batch {
        let result = match &item {
            SinkItem::Turn(doc) => insert_turn(client, doc),
            SinkItem::Match(doc) => upsert_match(client, doc),
            SinkItem::ModelStat {
                model_id,
                event_type,
                win,
                draw,
                violations,
            } => update_model_stats(client, model_id, event_type, *win, *draw, *violations),
            SinkItem::Tournament { name, doc } => upsert_tournament(client, name, doc),
            SinkItem::Shutdown => Ok(()),
        };
        if let Err(e) = result {
            warn!("store write failed, discarding item: {e}");
        }
    }
}

fn insert_turn(client: &mut Client, doc: &Value) -> Result<(), postgres::Error> {
    client.execute(
        "INSERT INTO turns (match_id, turn_number, hand_number, player_id, model_id, \
         event_type, tournament_name, tier, round, doc) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        &[
            &doc["match_id"].as_str().unwrap_or(""),
            &doc["turn_number"].as_i64().unwrap_or(0),
            &doc["hand_number"].as_i64().unwrap_or(0),
            &doc["player_id"].as_str().unwrap_or(""),
            &doc["model_id"].as_str().unwrap_or(""),
            &doc["event_type"].as_str().unwrap_or(""),
            &doc["tournament_name"].as_str().unwrap_or(""),
            &doc["tier"].as_str().unwrap_or(""),
            &doc["round"].as_i64().unwrap_or(0),
            doc,
        ],
    )?;
    Ok(())
}

fn upsert_match(client: &mut Client, doc: &Value) -> Result<(), postgres::Error> {
    client.execute(
        "INSERT INTO matches (match_id, event_type, tournament_name, tier, round, winner, doc) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (match_id) DO UPDATE SET \
         event_type = EXCLUDED.event_type, tournament_name = EXCLUDED.tournament_name, \
         tier = EXCLUDED.tier, round = EXCLUDED.round, winner = EXCLUDED.winner, \
         doc = EXCLUDED.doc",
        &[
            &doc["match_id"].as_str().unwrap_or(""),
            &doc["event_type"].as_str().unwrap_or(""),
            &doc["tournament_name"].as_str().unwrap_or(""),
            &doc["tier"].as_str().unwrap_or(""),
            &doc["round"].as_i64().unwrap_or(0),
            &doc["winner"].as_str(),
            doc,
        ],
    )?;
    Ok(())
}

fn update_model_stats(
    client: &mut Client,
    model_id: &str,
    event_type: &str,
    win: bool,
    draw: bool,
    violations: i64,
) -> Result<(), postgres::Error> {
    let wins = i64::from(win);
    let draws = i64::from(draw);
    let losses = i64::from(!win && !draw);
    client.execute(
        "INSERT INTO models (model_id, total_matches, wins, losses, draws, total_violations, last_played) \
         VALUES ($1, 1, $2, $3, $4, $5, now()) \
         ON CONFLICT (model_id) DO UPDATE SET \
         total_matches = models.total_matches + 1, \
         wins = models.wins + EXCLUDED.wins, \
         losses = models.losses + EXCLUDED.losses, \
         draws = models.draws + EXCLUDED.draws, \
         total_violations = models.total_violations + EXCLUDED.total_violations, \
         last_played = now()",
        &[&model_id, &wins, &losses, &draws, &violations],
    )?;
    client.execute(
        "INSERT INTO model_event_stats (model_id, event_type, matches, wins, losses, draws) \
         VALUES ($1, $2, 1, $3, $4, $5) \
         ON CONFLICT (model_id, event_type) DO UPDATE SET \
         matches = model_event_stats.matches + 1, \
         wins = model_event_stats.wins + EXCLUDED.wins, \
         losses = model_event_stats.losses + EXCLUDED.losses, \
         draws = model_event_stats.draws + EXCLUDED.draws",
        &[&model_id, &event_type, &wins, &losses, &draws],
    )?;
    Ok(())
}

fn upsert_tournament(client: &mut Client, name: &str, doc: &Value) -> Result<(), postgres::Error> {
    client.execute(
        "INSERT INTO tournaments (name, doc) VALUES ($1, $2) \
         ON CONFLICT (name) DO UPDATE SET doc = EXCLUDED.doc",
        &[&name, doc],
    )?;
    Ok(())
}

fn ensure_schema(client: &mut Client) -> Result<(), postgres::Error> {
    client.batch_execute(
        "CREATE TABLE IF NOT EXISTS turns (
            id BIGSERIAL PRIMARY KEY,
            match_id TEXT NOT NULL,
            turn_number BIGINT NOT NULL,
            hand_number BIGINT NOT NULL,
            player_id TEXT NOT NULL,
            model_id TEXT,
            event_type TEXT,
            tournament_name TEXT,
            tier TEXT,
            round BIGINT,
            doc JSONB NOT NULL,
            ingested_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS turns_match_idx ON turns (match_id, turn_number);
        CREATE INDEX IF NOT EXISTS turns_model_idx ON turns (model_id);
        CREATE INDEX IF NOT EXISTS turns_event_idx ON turns (event_type);
        CREATE TABLE IF NOT EXISTS matches (
            match_id TEXT PRIMARY KEY,
            event_type TEXT,
            tournament_name TEXT,
            tier TEXT,
            round BIGINT,
            winner TEXT,
            doc JSONB NOT NULL,
            ingested_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE INDEX IF NOT EXISTS matches_event_idx ON matches (event_type);
        CREATE INDEX IF NOT EXISTS matches_tournament_idx ON matches (tournament_name);
        CREATE TABLE IF NOT EXISTS models (
            model_id TEXT PRIMARY KEY,
            total_matches BIGINT NOT NULL DEFAULT 0,
            wins BIGINT NOT NULL DEFAULT 0,
            losses BIGINT NOT NULL DEFAULT 0,
            draws BIGINT NOT NULL DEFAULT 0,
            total_violations BIGINT NOT NULL DEFAULT 0,
            last_played TIMESTAMPTZ
        );
        CREATE TABLE IF NOT EXISTS model_event_stats (
            model_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            matches BIGINT NOT NULL DEFAULT 0,
            wins BIGINT NOT NULL DEFAULT 0,
            losses BIGINT NOT NULL DEFAULT 0,
            draws BIGINT NOT NULL DEFAULT 0,
            PRIMARY KEY (model_id, event_type)
        );
        CREATE TABLE IF NOT EXISTS tournaments (
            name TEXT PRIMARY KEY,
            doc JSONB NOT NULL
        );",
    )
}

/// Extract the event type from a match id prefix
/// (`high_card-alpha-vs-beta-1a2b3c` → `high_card`).
fn infer_event_from_match_id(match_id: &str) -> String {
    match match_id.split('-').next() {
        Some(prefix) if !prefix.is_empty() => prefix.to_string(),
        _ => "unknown".to_string(),
    }
}

/// Infer the tier from the tournament name suffix
/// (`s2-league-bantam` → `bantam`).
fn infer_tier(tournament_name: &str) -> String {
    if tournament_name.is_empty() || tournament_name == "unknown" {
        return "unknown".to_string();
    }
    match tournament_name.rsplit_once('-') {
        Some((_, suffix)) => suffix.to_string(),
        None => "unknown".to_string(),
    }
}

/// Fill missing context fields from match-id and name inference.
fn resolve_context(match_id: &str, context: &TournamentContext) -> TournamentContext {
    let event_type = if context.event_type.is_empty() {
        infer_event_from_match_id(match_id)
    } else {
        context.event_type.clone()
    };
    let tournament_name = if context.tournament_name.is_empty() {
        "unknown".to_string()
    } else {
        context.tournament_name.clone()
    };
    let tier = if context.tier.is_empty() {
        infer_tier(&tournament_name)
    } else {
        context.tier.clone()
    };
    TournamentContext {
        tournament_name,
        event_type,
        tier,
        round: context.round,
    }
}

/// Unique argmax of the score map, or None on a tie.
fn derive_winner(
    scores: &HashMap<String, f64>,
    player_models: &HashMap<String, String>,
) -> Option<String> {
    let max = scores.values().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut top = scores
        .iter()
        .filter(|(_, s)| **s == max)
        .map(|(pid, _)| pid);
    let first = top.next()?;
    if top.next().is_some() {
        return None;
    }
    player_models.get(first).cloned()
}

fn sha256_hex(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_inferred_from_match_id_prefix() {
        assert_eq!(infer_event_from_match_id("holdem-a-vs-b-1a2b3c"), "holdem");
        assert_eq!(infer_event_from_match_id("high_card-a-vs-b-ff"), "high_card");
        assert_eq!(infer_event_from_match_id(""), "unknown");
    }

    #[test]
    fn tier_inferred_from_name_suffix() {
        assert_eq!(infer_tier("s2-league-bantam"), "bantam");
        assert_eq!(infer_tier("nosuffix"), "unknown");
        assert_eq!(infer_tier(""), "unknown");
    }

    #[test]
    fn resolve_context_fills_missing_fields() {
        let ctx = resolve_context("holdem-a-vs-b-1a2b3c", &TournamentContext::default());
        assert_eq!(ctx.event_type, "holdem");
        assert_eq!(ctx.tournament_name, "unknown");
        assert_eq!(ctx.tier, "unknown");
    }

    #[test]
    fn resolve_context_keeps_explicit_fields() {
        let ctx = TournamentContext {
            tournament_name: "s2-league-bantam".to_string(),
            event_type: "checkers".to_string(),
            tier: String::new(),
            round: 3,
        };
        let resolved = resolve_context("holdem-a-vs-b-1a2b3c", &ctx);
        assert_eq!(resolved.event_type, "checkers");
        assert_eq!(resolved.tier, "bantam");
        assert_eq!(resolved.round, 3);
    }

    #[test]
    fn winner_is_unique_argmax() {
        let scores = HashMap::from([
            ("player_a".to_string(), 120.0),
            ("player_b".to_string(), 80.0),
        ]);
        let models = HashMap::from([
            ("player_a".to_string(), "alpha".to_string()),
            ("player_b".to_string(), "beta".to_string()),
        ]);
        assert_eq!(derive_winner(&scores, &models).as_deref(), Some("alpha"));
    }

    #[test]
    fn tied_scores_yield_no_winner() {
        let scores = HashMap::from([
            ("player_a".to_string(), 100.0),
            ("player_b".to_string(), 100.0),
        ]);
        let models = HashMap::from([
            ("player_a".to_string(), "alpha".to_string()),
            ("player_b".to_string(), "beta".to_string()),
        ]);
        assert_eq!(derive_winner(&scores, &models), None);
    }

    #[test]
    fn disabled_sink_enqueues_are_noops() {
        let sink = TelemetrySink::disabled();
        let handle = sink.handle();
        assert!(handle.is_disabled());
        handle.register_tournament("t", serde_json::json!({}));
    }

    #[test]
    fn sha256_hex_is_stable() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
