//! Feature extraction from a player's game log.
//!
//! Every value in a [`FeatureVector`] is a deterministic function of games
//! dated strictly before the prediction date. The extractor re-checks that
//! guarantee on whatever the history source hands back and fails the call
//! if a single row is on or after the cutoff.

pub mod vector;
pub mod window;

pub use vector::{FeatureVector, FormFeatures, RateFeatures, VolumeFeatures};

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::db::models::GameObservation;
use crate::error::EngineError;
use crate::model::adjustments::PropContext;
use crate::model::stat_types::StatSpec;

/// Read access to the historical log store.
pub trait HistorySource {
    /// All of `player`'s games dated strictly before `as_of`, most recent first.
    fn history_before(&self, player: &str, as_of: NaiveDate) -> Result<Vec<GameObservation>>;
}

impl<T: HistorySource + ?Sized> HistorySource for &T {
    fn history_before(&self, player: &str, as_of: NaiveDate) -> Result<Vec<GameObservation>> {
        (**self).history_before(player, as_of)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSizes {
    pub long: usize,
    pub recent: usize,
    pub short: usize,
    pub micro: usize,
}

impl Default for WindowSizes {
    fn default() -> Self {
        WindowSizes {
            long: 20,
            recent: 10,
            short: 5,
            micro: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub windows: WindowSizes,
    pub momentum_window: usize,
    pub momentum_decay: f64,
    pub trend_window: usize,
    /// Divisor inside `tanh(slope / scale)`.
    pub trend_scale: f64,
    /// When false the raw OLS slope is reported.
    pub normalize_trend: bool,
    /// Fewer games than this marks the vector `insufficient_data`.
    pub min_games: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            windows: WindowSizes::default(),
            momentum_window: 10,
            momentum_decay: 3.0,
            trend_window: 10,
            trend_scale: 0.3,
            normalize_trend: true,
            min_games: 5,
        }
    }
}

/// Fail if any game is dated on or after `as_of`.
pub fn verify_temporal_safety(
    player: &str,
    games: &[GameObservation],
    as_of: NaiveDate,
) -> Result<(), EngineError> {
    match games.iter().find(|g| g.game_date >= as_of) {
        Some(g) => Err(EngineError::TemporalViolation {
            player: player.to_string(),
            as_of,
            offending: g.game_date,
        }),
        None => Ok(()),
    }
}

pub struct FeatureExtractor<H> {
    source: H,
    config: ExtractorConfig,
}

impl<H: HistorySource> FeatureExtractor<H> {
    pub fn new(source: H, config: ExtractorConfig) -> Self {
        FeatureExtractor { source, config }
    }

    /// Build the feature vector for `player`'s `spec` stat as of `as_of`.
    ///
    /// Returns the league-average default (flagged `insufficient_data`) when
    /// no usable history exists. A history row dated on/after `as_of` is a
    /// fatal [`EngineError::TemporalViolation`].
    pub fn extract(
        &self,
        player: &str,
        as_of: NaiveDate,
        context: &PropContext,
        spec: &StatSpec,
    ) -> Result<FeatureVector> {
        let games = self.source.history_before(player, as_of)?;
        if let Err(violation) = verify_temporal_safety(player, &games, as_of) {
            error!("{}", violation);
            return Err(violation.into());
        }

        // Rows lacking the stat (e.g. a pitcher's batting line) do not count.
        let series: Vec<(f64, bool)> = games
            .iter()
            .filter_map(|g| spec.value(&g.stats).map(|v| (v, spec.success_in(g, v))))
            .collect();

        if series.is_empty() {
            warn!(
                "No {} history for {} before {}; using league defaults",
                spec.name, player, as_of
            );
            return Ok(FeatureVector::league_default(spec, context.is_home));
        }

        let values: Vec<f64> = series.iter().map(|(v, _)| *v).collect();
        let outcomes: Vec<bool> = series.iter().map(|(_, o)| *o).collect();
        let context_values: Vec<f64> = match &spec.context_stat {
            Some(name) => games.iter().filter_map(|g| g.stat(name)).collect(),
            None => Vec::new(),
        };

        let features = self.compute(spec, &values, &outcomes, &context_values, context.is_home);
        debug!(
            player,
            stat = %spec.name,
            games = features.games_played,
            "extracted features"
        );
        Ok(features)
    }

    fn compute(
        &self,
        spec: &StatSpec,
        values: &[f64],
        outcomes: &[bool],
        context_values: &[f64],
        is_home: bool,
    ) -> FeatureVector {
        let w = &self.config.windows;
        let rate = |n: Option<usize>| window::success_rate(outcomes, n).unwrap_or(spec.league_rate);
        let avg = |n: Option<usize>| {
            window::mean(window::take(values, n)).unwrap_or(spec.league_mean)
        };
        let std = |n: Option<usize>| {
            window::population_std(window::take(values, n))
                .unwrap_or(spec.league_std)
                .max(spec.std_floor)
        };
        let trend_scale = self
            .config
            .normalize_trend
            .then_some(self.config.trend_scale);

        let games_played = values.len() as u32;

        FeatureVector {
            stat_type: spec.name.clone(),
            family: spec.family,
            rates: RateFeatures {
                season: rate(None),
                long: rate(Some(w.long)),
                recent: rate(Some(w.recent)),
                short: rate(Some(w.short)),
                micro: rate(Some(w.micro)),
            },
            volume: VolumeFeatures {
                avg_season: avg(None),
                avg_recent: avg(Some(w.recent)),
                avg_short: avg(Some(w.short)),
                std_season: std(None),
                std_recent: std(Some(w.recent)),
                trend: window::trend(values, self.config.trend_window, trend_scale),
                context_avg: window::mean(context_values),
            },
            form: FormFeatures {
                current_streak: window::current_streak(outcomes),
                max_streak: window::max_streak(outcomes),
                momentum: window::momentum(
                    outcomes,
                    self.config.momentum_window,
                    self.config.momentum_decay,
                )
                .unwrap_or(spec.league_rate),
            },
            is_home,
            games_played,
            insufficient_data: games_played < self.config.min_games,
        }
    }
}
