use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
use models::*;

use crate::features::HistorySource;

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Game logs ─────────────────────────────────────────────────────────────

    /// Insert or refresh one game row, keyed by (player, game_date, game_id).
    pub fn upsert_game_observation(&self, obs: &GameObservation) -> Result<()> {
        let conn = self.conn()?;
        upsert_observation_on(&conn, obs)?;
        Ok(())
    }

    /// Bulk upsert in one transaction. Returns the number of rows written.
    pub fn upsert_game_observations(&self, rows: &[GameObservation]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for obs in rows {
            upsert_observation_on(&tx, obs)?;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Every game of `player` dated strictly before `as_of`, most recent first.
    pub fn history_before(&self, player: &str, as_of: NaiveDate) -> Result<Vec<GameObservation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, player, team, opponent, game_id, game_date, is_home,
                    stats_json, targets_json
             FROM game_logs
             WHERE player = ?1 AND game_date < ?2
             ORDER BY game_date DESC, game_id DESC",
        )?;
        let rows = stmt
            .query_map(params![player, as_of], map_observation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_game_observations(&self) -> Result<i64> {
        let conn = self.conn()?;
        let n = conn.query_row("SELECT COUNT(*) FROM game_logs", [], |r| r.get(0))?;
        Ok(n)
    }

    // ── Predictions ───────────────────────────────────────────────────────────

    /// Persist a prediction. Returns false when the
    /// (game_date, player, stat_type, line) key already exists.
    pub fn insert_prediction(&self, p: &Prediction) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT INTO predictions (
                game_date, player, team, opponent, stat_type, line, side,
                probability, confidence, tier, model_version, batch_id,
                features_json, created_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
             ON CONFLICT(game_date, player, stat_type, line) DO NOTHING",
            params![
                p.game_date,
                p.player,
                p.team,
                p.opponent,
                p.stat_type,
                p.line,
                p.side.as_str(),
                p.probability,
                p.confidence,
                p.tier.as_str(),
                p.model_version,
                p.batch_id,
                p.features_json,
                p.created_at,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn count_predictions(&self, date: NaiveDate) -> Result<i64> {
        let conn = self.conn()?;
        let n = conn.query_row(
            "SELECT COUNT(*) FROM predictions WHERE game_date = ?1",
            params![date],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    /// Drop the date's predictions that have no outcome yet. Graded rows stay.
    pub fn delete_ungraded_predictions(&self, date: NaiveDate) -> Result<usize> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM predictions
             WHERE game_date = ?1
               AND id NOT IN (SELECT prediction_id FROM outcomes)",
            params![date],
        )?;
        Ok(n)
    }

    pub fn predictions_for_date(&self, date: NaiveDate) -> Result<Vec<Prediction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, game_date, player, team, opponent, stat_type, line, side,
                    probability, confidence, tier, model_version, batch_id,
                    features_json, created_at
             FROM predictions WHERE game_date = ?1
             ORDER BY player, stat_type, line",
        )?;
        let rows = stmt
            .query_map(params![date], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Outcomes ──────────────────────────────────────────────────────────────

    pub fn graded_prediction_ids(&self, date: NaiveDate) -> Result<HashSet<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT prediction_id FROM outcomes WHERE game_date = ?1")?;
        let ids = stmt
            .query_map(params![date], |r| r.get(0))?
            .collect::<rusqlite::Result<HashSet<i64>>>()?;
        Ok(ids)
    }

    /// Write a date's graded outcomes and the observations behind them in
    /// a single transaction. Observations are upserted; an outcome for an
    /// already-graded prediction is ignored. Returns (observations, new outcomes).
    pub fn commit_grading(
        &self,
        observations: &[GameObservation],
        outcomes: &[Outcome],
    ) -> Result<(usize, usize)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for obs in observations {
            upsert_observation_on(&tx, obs)?;
        }
        let mut inserted = 0;
        for o in outcomes {
            inserted += tx.execute(
                "INSERT INTO outcomes (
                    prediction_id, game_date, player, stat_type, line, predicted,
                    actual_value, result, match_tier, matched_name, graded_at
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)
                 ON CONFLICT(prediction_id) DO NOTHING",
                params![
                    o.prediction_id,
                    o.game_date,
                    o.player,
                    o.stat_type,
                    o.line,
                    o.predicted.as_str(),
                    o.actual_value,
                    o.result.as_str(),
                    o.match_tier,
                    o.matched_name,
                    o.graded_at,
                ],
            )?;
        }
        tx.commit()?;
        Ok((observations.len(), inserted))
    }

    pub fn outcomes_for_date(&self, date: NaiveDate) -> Result<Vec<Outcome>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, prediction_id, game_date, player, stat_type, line, predicted,
                    actual_value, result, match_tier, matched_name, graded_at
             FROM outcomes WHERE game_date = ?1 ORDER BY prediction_id",
        )?;
        let rows = stmt
            .query_map(params![date], map_outcome)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Stats ─────────────────────────────────────────────────────────────────

    /// Hit / miss / push counts per confidence tier over every graded prediction.
    pub fn accuracy_by_tier(&self) -> Result<Vec<TierAccuracy>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT p.tier,
                    SUM(o.result = 'HIT'),
                    SUM(o.result = 'MISS'),
                    SUM(o.result = 'PUSH')
             FROM outcomes o JOIN predictions p ON p.id = o.prediction_id
             GROUP BY p.tier ORDER BY p.tier",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TierAccuracy {
                    tier: row.get(0)?,
                    hits: row.get(1)?,
                    misses: row.get(2)?,
                    pushes: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl HistorySource for Database {
    fn history_before(&self, player: &str, as_of: NaiveDate) -> Result<Vec<GameObservation>> {
        Database::history_before(self, player, as_of)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn upsert_observation_on(conn: &Connection, obs: &GameObservation) -> Result<usize> {
    let stats_json = serde_json::to_string(&obs.stats)?;
    let targets_json = serde_json::to_string(&obs.targets)?;
    let n = conn.execute(
        "INSERT INTO game_logs (
            player, team, opponent, game_id, game_date, is_home,
            stats_json, targets_json, recorded_at
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
         ON CONFLICT(player, game_date, game_id) DO UPDATE SET
            team=excluded.team,
            opponent=excluded.opponent,
            is_home=excluded.is_home,
            stats_json=excluded.stats_json,
            targets_json=excluded.targets_json,
            recorded_at=excluded.recorded_at",
        params![
            obs.player,
            obs.team,
            obs.opponent,
            obs.game_id,
            obs.game_date,
            obs.is_home,
            stats_json,
            targets_json,
            Utc::now(),
        ],
    )?;
    Ok(n)
}

fn json_column<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parsed_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = anyhow::Error>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: anyhow::Error| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
    })
}

fn map_observation(row: &rusqlite::Row) -> rusqlite::Result<GameObservation> {
    Ok(GameObservation {
        id: row.get(0)?,
        player: row.get(1)?,
        team: row.get(2)?,
        opponent: row.get(3)?,
        game_id: row.get(4)?,
        game_date: row.get(5)?,
        is_home: row.get(6)?,
        stats: json_column(row, 7)?,
        targets: json_column(row, 8)?,
    })
}

fn map_prediction(row: &rusqlite::Row) -> rusqlite::Result<Prediction> {
    Ok(Prediction {
        id: row.get(0)?,
        game_date: row.get(1)?,
        player: row.get(2)?,
        team: row.get(3)?,
        opponent: row.get(4)?,
        stat_type: row.get(5)?,
        line: row.get(6)?,
        side: parsed_column(row, 7)?,
        probability: row.get(8)?,
        confidence: row.get(9)?,
        tier: parsed_column(row, 10)?,
        model_version: row.get(11)?,
        batch_id: row.get(12)?,
        features_json: row.get(13)?,
        created_at: row.get(14)?,
    })
}

fn map_outcome(row: &rusqlite::Row) -> rusqlite::Result<Outcome> {
    Ok(Outcome {
        id: row.get(0)?,
        prediction_id: row.get(1)?,
        game_date: row.get(2)?,
        player: row.get(3)?,
        stat_type: row.get(4)?,
        line: row.get(5)?,
        predicted: parsed_column(row, 6)?,
        actual_value: row.get(7)?,
        result: parsed_column(row, 8)?,
        match_tier: row.get(9)?,
        matched_name: row.get(10)?,
        graded_at: row.get(11)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS game_logs (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    player       TEXT    NOT NULL,
    team         TEXT    NOT NULL,
    opponent     TEXT    NOT NULL,
    game_id      TEXT    NOT NULL,
    game_date    TEXT    NOT NULL,
    is_home      INTEGER NOT NULL DEFAULT 0,
    stats_json   TEXT    NOT NULL,
    targets_json TEXT    NOT NULL,
    recorded_at  TEXT    NOT NULL,
    UNIQUE (player, game_date, game_id)
);

CREATE TABLE IF NOT EXISTS predictions (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    game_date     TEXT    NOT NULL,
    player        TEXT    NOT NULL,
    team          TEXT    NOT NULL,
    opponent      TEXT    NOT NULL,
    stat_type     TEXT    NOT NULL,
    line          REAL    NOT NULL,
    side          TEXT    NOT NULL,
    probability   REAL    NOT NULL,
    confidence    REAL    NOT NULL,
    tier          TEXT    NOT NULL,
    model_version TEXT    NOT NULL,
    batch_id      TEXT    NOT NULL,
    features_json TEXT    NOT NULL,
    created_at    TEXT    NOT NULL,
    UNIQUE (game_date, player, stat_type, line)
);

CREATE TABLE IF NOT EXISTS outcomes (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    prediction_id INTEGER NOT NULL UNIQUE,
    game_date     TEXT    NOT NULL,
    player        TEXT    NOT NULL,
    stat_type     TEXT    NOT NULL,
    line          REAL    NOT NULL,
    predicted     TEXT    NOT NULL,
    actual_value  REAL    NOT NULL,
    result        TEXT    NOT NULL,
    match_tier    TEXT    NOT NULL,
    matched_name  TEXT    NOT NULL,
    graded_at     TEXT    NOT NULL,
    FOREIGN KEY (prediction_id) REFERENCES predictions(id)
);

CREATE INDEX IF NOT EXISTS idx_game_logs_player_date ON game_logs(player, game_date);
CREATE INDEX IF NOT EXISTS idx_predictions_date ON predictions(game_date);
CREATE INDEX IF NOT EXISTS idx_outcomes_date ON outcomes(game_date);
"#;

/// Graded totals for one confidence tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierAccuracy {
    pub tier: String,
    pub hits: i64,
    pub misses: i64,
    pub pushes: i64,
}

impl TierAccuracy {
    /// Hit rate over decided (non-push) predictions.
    pub fn accuracy(&self) -> Option<f64> {
        let decided = self.hits + self.misses;
        (decided > 0).then(|| self.hits as f64 / decided as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::calibration::ConfidenceTier;
    use std::collections::BTreeMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn obs(player: &str, day: NaiveDate, game_id: &str, shots: f64) -> GameObservation {
        GameObservation {
            id: None,
            player: player.into(),
            team: "COL".into(),
            opponent: "DAL".into(),
            game_id: game_id.into(),
            game_date: day,
            is_home: true,
            stats: [("shots".to_string(), shots)].into_iter().collect(),
            targets: BTreeMap::new(),
        }
    }

    fn prediction(player: &str, day: NaiveDate, stat: &str, line: f64) -> Prediction {
        Prediction {
            id: None,
            game_date: day,
            player: player.into(),
            team: "COL".into(),
            opponent: "DAL".into(),
            stat_type: stat.into(),
            line,
            side: Side::Over,
            probability: 0.62,
            confidence: 0.62,
            tier: ConfidenceTier::T3Good,
            model_version: "v-test".into(),
            batch_id: "20251101_090000".into(),
            features_json: "{}".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn history_is_strictly_before_and_most_recent_first() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_game_observation(&obs("Nathan MacKinnon", date(2025, 10, 1), "a", 4.0)).unwrap();
        db.upsert_game_observation(&obs("Nathan MacKinnon", date(2025, 10, 5), "b", 6.0)).unwrap();
        db.upsert_game_observation(&obs("Nathan MacKinnon", date(2025, 10, 9), "c", 2.0)).unwrap();
        db.upsert_game_observation(&obs("Cale Makar", date(2025, 10, 3), "a", 3.0)).unwrap();

        let rows = db.history_before("Nathan MacKinnon", date(2025, 10, 9)).unwrap();
        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.game_date).collect();
        assert_eq!(dates, vec![date(2025, 10, 5), date(2025, 10, 1)]);
        assert_eq!(rows[0].stat("shots"), Some(6.0));
    }

    #[test]
    fn observation_upsert_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let mut row = obs("Cale Makar", date(2025, 10, 3), "g1", 3.0);
        db.upsert_game_observation(&row).unwrap();
        row.stats.insert("shots".into(), 5.0);
        db.upsert_game_observation(&row).unwrap();

        assert_eq!(db.count_game_observations().unwrap(), 1);
        let rows = db.history_before("Cale Makar", date(2025, 10, 4)).unwrap();
        assert_eq!(rows[0].stat("shots"), Some(5.0));
    }

    #[test]
    fn duplicate_prediction_is_not_an_error() {
        let db = Database::open_in_memory().unwrap();
        let p = prediction("Mikko Rantanen", date(2025, 11, 1), "shots", 3.5);
        assert!(db.insert_prediction(&p).unwrap());
        assert!(!db.insert_prediction(&p).unwrap());
        assert_eq!(db.count_predictions(date(2025, 11, 1)).unwrap(), 1);

        let stored = db.predictions_for_date(date(2025, 11, 1)).unwrap();
        assert_eq!(stored[0].tier, ConfidenceTier::T3Good);
        assert_eq!(stored[0].side, Side::Over);
        assert!(stored[0].id.is_some());
    }

    #[test]
    fn grading_commit_ignores_second_outcome() {
        let db = Database::open_in_memory().unwrap();
        let day = date(2025, 11, 1);
        db.insert_prediction(&prediction("Mikko Rantanen", day, "shots", 3.5)).unwrap();
        let id = db.predictions_for_date(day).unwrap()[0].id.unwrap();

        let outcome = Outcome {
            id: None,
            prediction_id: id,
            game_date: day,
            player: "Mikko Rantanen".into(),
            stat_type: "shots".into(),
            line: 3.5,
            predicted: Side::Over,
            actual_value: 5.0,
            result: OutcomeResult::Hit,
            match_tier: "exact".into(),
            matched_name: "Mikko Rantanen".into(),
            graded_at: Utc::now(),
        };
        let game = obs("Mikko Rantanen", day, "g9", 5.0);
        assert_eq!(db.commit_grading(&[game.clone()], &[outcome.clone()]).unwrap(), (1, 1));
        assert_eq!(db.commit_grading(&[game], &[outcome]).unwrap(), (1, 0));
        assert_eq!(db.count_game_observations().unwrap(), 1);
        assert_eq!(db.graded_prediction_ids(day).unwrap().len(), 1);
        assert_eq!(db.outcomes_for_date(day).unwrap()[0].result, OutcomeResult::Hit);

        let acc = db.accuracy_by_tier().unwrap();
        assert_eq!(acc.len(), 1);
        assert_eq!(acc[0].tier, "T3-GOOD");
        assert_eq!(acc[0].accuracy(), Some(1.0));
    }

    #[test]
    fn force_delete_keeps_graded_predictions() {
        let db = Database::open_in_memory().unwrap();
        let day = date(2025, 11, 2);
        db.insert_prediction(&prediction("Gabriel Landeskog", day, "points", 0.5)).unwrap();
        db.insert_prediction(&prediction("Valeri Nichushkin", day, "points", 0.5)).unwrap();
        let graded = db
            .predictions_for_date(day)
            .unwrap()
            .into_iter()
            .find(|p| p.player == "Gabriel Landeskog")
            .unwrap();
        let outcome = Outcome {
            id: None,
            prediction_id: graded.id.unwrap(),
            game_date: day,
            player: graded.player.clone(),
            stat_type: "points".into(),
            line: 0.5,
            predicted: Side::Over,
            actual_value: 0.0,
            result: OutcomeResult::Miss,
            match_tier: "exact".into(),
            matched_name: graded.player.clone(),
            graded_at: Utc::now(),
        };
        db.commit_grading(&[], &[outcome]).unwrap();

        assert_eq!(db.delete_ungraded_predictions(day).unwrap(), 1);
        let left = db.predictions_for_date(day).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].player, "Gabriel Landeskog");
    }
}
