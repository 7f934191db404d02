use serde::{Deserialize, Serialize};

use crate::model::stat_types::{DistributionFamily, StatSpec};

/// Success rates over the configured windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateFeatures {
    pub season: f64,
    pub long: f64,
    pub recent: f64,
    pub short: f64,
    pub micro: f64,
}

/// Averages, spread and direction of the raw stat value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeFeatures {
    pub avg_season: f64,
    pub avg_recent: f64,
    pub avg_short: f64,
    pub std_season: f64,
    pub std_recent: f64,
    /// OLS slope over the trend window, tanh-normalised unless disabled.
    pub trend: f64,
    /// Average of the stat's usage context (minutes, snaps) when it has one.
    pub context_avg: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormFeatures {
    /// Positive: consecutive successes; negative: consecutive failures.
    pub current_streak: i32,
    pub max_streak: u32,
    /// Exponentially weighted recent success rate.
    pub momentum: f64,
}

/// Fixed-schema feature record for one (player, stat type, as-of date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub stat_type: String,
    pub family: DistributionFamily,
    pub rates: RateFeatures,
    pub volume: VolumeFeatures,
    pub form: FormFeatures,
    pub is_home: bool,
    pub games_played: u32,
    pub insufficient_data: bool,
}

impl FeatureVector {
    /// League-average vector for a player with no usable history.
    pub fn league_default(spec: &StatSpec, is_home: bool) -> Self {
        let rate = spec.league_rate;
        let std = spec.league_std.max(spec.std_floor);
        FeatureVector {
            stat_type: spec.name.clone(),
            family: spec.family,
            rates: RateFeatures {
                season: rate,
                long: rate,
                recent: rate,
                short: rate,
                micro: rate,
            },
            volume: VolumeFeatures {
                avg_season: spec.league_mean,
                avg_recent: spec.league_mean,
                avg_short: spec.league_mean,
                std_season: std,
                std_recent: std,
                trend: 0.0,
                context_avg: None,
            },
            form: FormFeatures {
                current_streak: 0,
                max_streak: 0,
                momentum: rate,
            },
            is_home,
            games_played: 0,
            insufficient_data: true,
        }
    }
}
