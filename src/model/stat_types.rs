//! Stat taxonomy: which statistics can be predicted, how their value is read
//! from a game row, which distribution models them and what the league-wide
//! fallback constants are.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::models::{GameObservation, PlayerResult, Side};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionFamily {
    /// Yes/no outcome; probability read from windowed success rates.
    Binary,
    /// Low counts (goals, strikeouts); P(X > line) from a Poisson λ.
    Poisson,
    /// Volume stats (shots, yards); P(X > line) from a Normal(μ, σ).
    Normal,
}

impl DistributionFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionFamily::Binary => "binary",
            DistributionFamily::Poisson => "poisson",
            DistributionFamily::Normal => "normal",
        }
    }

    /// (over side, under side) labels for this family.
    pub fn sides(&self) -> (Side, Side) {
        match self {
            DistributionFamily::Binary => (Side::Yes, Side::No),
            DistributionFamily::Poisson | DistributionFamily::Normal => (Side::Over, Side::Under),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSpec {
    /// Stat type name used on props and predictions.
    pub name: String,
    pub family: DistributionFamily,
    /// Feed stats summed to form the value. Empty means the stat named `name`.
    #[serde(default)]
    pub components: Vec<String>,
    /// A game counts as a success when its value reaches this threshold.
    pub success_threshold: f64,
    /// League-average success rate, used when a player has no history.
    pub league_rate: f64,
    /// League-average per-game value.
    pub league_mean: f64,
    /// League-average per-game standard deviation.
    pub league_std: f64,
    /// Lower bound applied to every standard deviation of this stat.
    pub std_floor: f64,
    /// Optional usage stat averaged alongside (time on ice, snaps, minutes).
    #[serde(default)]
    pub context_stat: Option<String>,
}

impl StatSpec {
    fn new(name: &str, family: DistributionFamily, success_threshold: f64) -> Self {
        StatSpec {
            name: name.to_string(),
            family,
            components: Vec::new(),
            success_threshold,
            league_rate: 0.5,
            league_mean: success_threshold,
            league_std: 1.0,
            std_floor: 0.5,
            context_stat: None,
        }
    }

    fn league(mut self, rate: f64, mean: f64, std: f64, floor: f64) -> Self {
        self.league_rate = rate;
        self.league_mean = mean;
        self.league_std = std;
        self.std_floor = floor;
        self
    }

    fn sum_of(mut self, components: &[&str]) -> Self {
        self.components = components.iter().map(|c| c.to_string()).collect();
        self
    }

    fn with_context(mut self, stat: &str) -> Self {
        self.context_stat = Some(stat.to_string());
        self
    }

    /// Value of this stat in a row of raw feed stats. `None` when any
    /// component is missing.
    pub fn value(&self, stats: &BTreeMap<String, f64>) -> Option<f64> {
        if self.components.is_empty() {
            return stats.get(&self.name).copied();
        }
        self.components
            .iter()
            .map(|c| stats.get(c).copied())
            .sum::<Option<f64>>()
    }

    pub fn is_success(&self, value: f64) -> bool {
        value >= self.success_threshold
    }

    /// Success flag of a stored game: the precomputed target when present,
    /// otherwise derived from the value.
    pub fn success_in(&self, obs: &GameObservation, value: f64) -> bool {
        obs.targets
            .get(&self.name)
            .copied()
            .unwrap_or_else(|| self.is_success(value))
    }
}

/// The set of stat types a sport vertical predicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatCatalog {
    stats: Vec<StatSpec>,
}

impl StatCatalog {
    pub fn new(stats: Vec<StatSpec>) -> Self {
        StatCatalog { stats }
    }

    pub fn get(&self, name: &str) -> Option<&StatSpec> {
        self.stats.iter().find(|s| s.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&StatSpec, EngineError> {
        self.get(name)
            .ok_or_else(|| EngineError::UnknownStatType(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &StatSpec> {
        self.stats.iter()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Binary targets for every catalog stat present in `stats`.
    pub fn derive_targets(&self, stats: &BTreeMap<String, f64>) -> BTreeMap<String, bool> {
        self.stats
            .iter()
            .filter_map(|spec| spec.value(stats).map(|v| (spec.name.clone(), spec.is_success(v))))
            .collect()
    }

    /// Build the log-store row for a feed result, targets precomputed.
    pub fn observation_from_result(&self, result: &PlayerResult) -> GameObservation {
        GameObservation {
            id: None,
            player: result.player.clone(),
            team: result.team.clone(),
            opponent: result.opponent.clone(),
            game_id: result.game_id.clone(),
            game_date: result.game_date,
            is_home: result.is_home,
            stats: result.stats.clone(),
            targets: self.derive_targets(&result.stats),
        }
    }

    // ── Presets ──────────────────────────────────────────────────────────────

    pub fn nhl() -> Self {
        use DistributionFamily::*;
        StatCatalog::new(vec![
            StatSpec::new("points", Binary, 1.0).league(0.35, 0.55, 0.75, 0.3),
            StatSpec::new("shots", Normal, 3.0)
                .league(0.40, 2.5, 1.2, 0.5)
                .with_context("toi_minutes"),
            StatSpec::new("goals", Poisson, 1.0).league(0.25, 0.30, 0.55, 0.3),
            StatSpec::new("assists", Poisson, 1.0).league(0.30, 0.40, 0.60, 0.3),
        ])
    }

    pub fn nba() -> Self {
        use DistributionFamily::*;
        StatCatalog::new(vec![
            StatSpec::new("points", Poisson, 20.0)
                .league(0.30, 14.0, 7.0, 3.0)
                .with_context("minutes"),
            StatSpec::new("rebounds", Poisson, 6.0).league(0.35, 5.0, 3.0, 1.5),
            StatSpec::new("assists", Poisson, 5.0).league(0.30, 3.5, 2.5, 1.5),
            StatSpec::new("threes", Poisson, 2.0).league(0.40, 1.4, 1.2, 0.8),
            StatSpec::new("pra", Normal, 25.0)
                .league(0.40, 23.0, 9.0, 4.0)
                .sum_of(&["points", "rebounds", "assists"])
                .with_context("minutes"),
            StatSpec::new("minutes", Normal, 28.0).league(0.45, 26.0, 7.0, 3.0),
        ])
    }

    pub fn mlb() -> Self {
        use DistributionFamily::*;
        StatCatalog::new(vec![
            StatSpec::new("hits", Binary, 1.0).league(0.60, 0.95, 0.85, 0.4),
            StatSpec::new("total_bases", Poisson, 2.0).league(0.35, 1.45, 1.4, 0.7),
            StatSpec::new("pitcher_strikeouts", Poisson, 6.0)
                .league(0.40, 5.2, 2.2, 1.0)
                .with_context("innings_pitched"),
        ])
    }

    pub fn nfl() -> Self {
        use DistributionFamily::*;
        StatCatalog::new(vec![
            StatSpec::new("rush_yards", Normal, 60.0)
                .league(0.35, 55.0, 25.0, 15.0)
                .with_context("snap_pct"),
            StatSpec::new("receiving_yards", Normal, 50.0)
                .league(0.35, 45.0, 22.0, 12.0)
                .with_context("snap_pct"),
            StatSpec::new("receptions", Poisson, 4.0).league(0.45, 3.8, 2.0, 1.0),
            StatSpec::new("anytime_td", Binary, 1.0)
                .league(0.30, 0.35, 0.55, 0.3)
                .sum_of(&["rush_tds", "receiving_tds"]),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn stats(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn composite_stat_sums_components() {
        let catalog = StatCatalog::nba();
        let pra = catalog.get("pra").unwrap();
        let row = stats(&[("points", 21.0), ("rebounds", 7.0), ("assists", 4.0)]);
        assert_eq!(pra.value(&row), Some(32.0));
        let partial = stats(&[("points", 21.0), ("rebounds", 7.0)]);
        assert_eq!(pra.value(&partial), None);
    }

    #[test]
    fn unknown_stat_is_typed_error() {
        let catalog = StatCatalog::nhl();
        let err = catalog.require("hat_tricks").unwrap_err();
        assert!(matches!(err, EngineError::UnknownStatType(ref s) if s == "hat_tricks"));
    }

    #[test]
    fn observation_precomputes_targets() {
        let catalog = StatCatalog::nhl();
        let result = PlayerResult {
            player: "Connor McDavid".into(),
            team: "EDM".into(),
            opponent: "CGY".into(),
            game_id: "2025020101".into(),
            game_date: NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
            is_home: true,
            stats: stats(&[("points", 2.0), ("shots", 2.0), ("goals", 0.0)]),
        };
        let obs = catalog.observation_from_result(&result);
        assert_eq!(obs.targets.get("points"), Some(&true));
        assert_eq!(obs.targets.get("shots"), Some(&false));
        assert_eq!(obs.targets.get("goals"), Some(&false));
        // No assists in the feed row: no target written
        assert!(!obs.targets.contains_key("assists"));
    }

    #[test]
    fn family_sides() {
        assert_eq!(DistributionFamily::Binary.sides(), (Side::Yes, Side::No));
        assert_eq!(DistributionFamily::Normal.sides(), (Side::Over, Side::Under));
    }
}
