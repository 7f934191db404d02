use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::model::adjustments::ContextFactors;
use crate::model::calibration::ConfidenceTier;

/// One player's recorded performance in one completed game.
///
/// Unique on `(player, game_date, game_id)`; written once by grading or
/// ingest and only ever upserted afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameObservation {
    pub id: Option<i64>,
    pub player: String,
    pub team: String,
    pub opponent: String,
    pub game_id: String,
    pub game_date: NaiveDate,
    pub is_home: bool,
    /// Raw counting / continuous stats keyed by feed name (e.g. "points", "sog").
    pub stats: BTreeMap<String, f64>,
    /// Binary targets precomputed at write time, keyed by stat type.
    pub targets: BTreeMap<String, bool>,
}

impl GameObservation {
    pub fn stat(&self, name: &str) -> Option<f64> {
        self.stats.get(name).copied()
    }
}

/// One player's box-score line as delivered by a results feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerResult {
    pub player: String,
    pub team: String,
    pub opponent: String,
    pub game_id: String,
    pub game_date: NaiveDate,
    #[serde(default)]
    pub is_home: bool,
    #[serde(default)]
    pub stats: BTreeMap<String, f64>,
}

/// A prop line offered for a player on the slate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropLine {
    pub stat_type: String,
    pub line: f64,
}

/// One player appearing on a date's slate, with the props to predict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlateEntry {
    pub player: String,
    pub team: String,
    pub opponent: String,
    pub game_date: NaiveDate,
    #[serde(default)]
    pub is_home: bool,
    #[serde(default)]
    pub factors: ContextFactors,
    #[serde(default)]
    pub props: Vec<PropLine>,
}

/// Side of a prop line. Binary stats use YES/NO, count stats OVER/UNDER.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Over,
    Under,
    Yes,
    No,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Over => "OVER",
            Side::Under => "UNDER",
            Side::Yes => "YES",
            Side::No => "NO",
        }
    }

    /// True for OVER / YES.
    pub fn is_over(&self) -> bool {
        matches!(self, Side::Over | Side::Yes)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OVER" => Ok(Side::Over),
            "UNDER" => Ok(Side::Under),
            "YES" => Ok(Side::Yes),
            "NO" => Ok(Side::No),
            other => anyhow::bail!("unknown side '{}'", other),
        }
    }
}

/// A persisted (player, date, stat type, line) decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Option<i64>,
    pub game_date: NaiveDate,
    pub player: String,
    pub team: String,
    pub opponent: String,
    pub stat_type: String,
    pub line: f64,
    pub side: Side,
    /// Calibrated probability of the OVER / YES side.
    pub probability: f64,
    /// Probability of the predicted side.
    pub confidence: f64,
    pub tier: ConfidenceTier,
    pub model_version: String,
    pub batch_id: String,
    /// Serialized feature vector plus engine diagnostics.
    pub features_json: String,
    pub created_at: DateTime<Utc>,
}

/// Resolution of a graded prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeResult {
    Hit,
    Miss,
    /// Actual value landed exactly on the line.
    Push,
}

impl OutcomeResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeResult::Hit => "HIT",
            OutcomeResult::Miss => "MISS",
            OutcomeResult::Push => "PUSH",
        }
    }
}

impl FromStr for OutcomeResult {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIT" => Ok(OutcomeResult::Hit),
            "MISS" => Ok(OutcomeResult::Miss),
            "PUSH" => Ok(OutcomeResult::Push),
            other => anyhow::bail!("unknown outcome '{}'", other),
        }
    }
}

/// Graded result of a prediction. At most one per prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub id: Option<i64>,
    pub prediction_id: i64,
    pub game_date: NaiveDate,
    pub player: String,
    pub stat_type: String,
    pub line: f64,
    pub predicted: Side,
    pub actual_value: f64,
    pub result: OutcomeResult,
    /// Which name-matching strategy reconciled the player ("exact", "normalized", ...).
    pub match_tier: String,
    /// Player name as spelled by the results feed.
    pub matched_name: String,
    pub graded_at: DateTime<Utc>,
}
