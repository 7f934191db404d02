//! Contextual adjustments applied on top of a base probability / expectation.
//!
//! Every adjustment is a named multiplier computed from the feature vector,
//! the game context and the immutable [`AdjustmentConfig`]. The pipelines
//! below fix the order they are folded in:
//!
//! - binary: streak, momentum, home, opponent, venue, weather, rest, game script
//! - count (Poisson / Normal): form, home, opponent, venue, weather, rest, game script

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::features::FeatureVector;
use crate::model::stat_types::DistributionFamily;

/// Matchup and environment multipliers for one game, produced by the
/// sport-specific tables (park factors, weather thresholds, defensive ranks)
/// upstream of the engine. 1.0 means neutral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextFactors {
    pub opponent: f64,
    pub venue: f64,
    pub weather: f64,
    pub rest: f64,
    pub game_script: f64,
}

impl Default for ContextFactors {
    fn default() -> Self {
        ContextFactors {
            opponent: 1.0,
            venue: 1.0,
            weather: 1.0,
            rest: 1.0,
            game_script: 1.0,
        }
    }
}

impl ContextFactors {
    pub fn validate(&self) -> Result<(), EngineError> {
        let named = [
            ("opponent", self.opponent),
            ("venue", self.venue),
            ("weather", self.weather),
            ("rest", self.rest),
            ("game_script", self.game_script),
        ];
        for (name, value) in named {
            if !value.is_finite() || value <= 0.0 {
                return Err(EngineError::InvalidContext { name, value });
            }
        }
        Ok(())
    }
}

/// Game context for a prediction. Only `is_home` and `factors` influence the
/// numbers; team and opponent are carried onto the persisted prediction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropContext {
    pub is_home: bool,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub opponent: Option<String>,
    #[serde(default)]
    pub factors: ContextFactors,
}

/// Heuristic magnitudes. Hand-tuned numbers, kept as data so each sport can
/// override them from its model config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustmentConfig {
    /// |current_streak| at which the streak adjustment kicks in.
    pub streak_length: i32,
    pub hot_streak: f64,
    pub cold_streak: f64,
    /// Momentum minus season rate needed to nudge.
    pub momentum_edge: f64,
    pub momentum_up: f64,
    pub momentum_down: f64,
    /// Short-window average relative to season average marking hot / cold form.
    pub form_hot_ratio: f64,
    pub form_cold_ratio: f64,
    pub form_hot: f64,
    pub form_cold: f64,
    pub home: f64,
}

impl Default for AdjustmentConfig {
    fn default() -> Self {
        AdjustmentConfig {
            streak_length: 3,
            hot_streak: 1.10,
            cold_streak: 0.90,
            momentum_edge: 0.15,
            momentum_up: 1.05,
            momentum_down: 0.95,
            form_hot_ratio: 1.10,
            form_cold_ratio: 0.90,
            form_hot: 1.10,
            form_cold: 0.90,
            home: 1.03,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    Streak,
    Momentum,
    Form,
    Home,
    Opponent,
    Venue,
    Weather,
    Rest,
    GameScript,
}

pub const BINARY_PIPELINE: &[AdjustmentKind] = &[
    AdjustmentKind::Streak,
    AdjustmentKind::Momentum,
    AdjustmentKind::Home,
    AdjustmentKind::Opponent,
    AdjustmentKind::Venue,
    AdjustmentKind::Weather,
    AdjustmentKind::Rest,
    AdjustmentKind::GameScript,
];

pub const COUNT_PIPELINE: &[AdjustmentKind] = &[
    AdjustmentKind::Form,
    AdjustmentKind::Home,
    AdjustmentKind::Opponent,
    AdjustmentKind::Venue,
    AdjustmentKind::Weather,
    AdjustmentKind::Rest,
    AdjustmentKind::GameScript,
];

pub fn pipeline_for(family: DistributionFamily) -> &'static [AdjustmentKind] {
    match family {
        DistributionFamily::Binary => BINARY_PIPELINE,
        DistributionFamily::Poisson | DistributionFamily::Normal => COUNT_PIPELINE,
    }
}

impl AdjustmentKind {
    pub fn name(&self) -> &'static str {
        match self {
            AdjustmentKind::Streak => "streak",
            AdjustmentKind::Momentum => "momentum",
            AdjustmentKind::Form => "form",
            AdjustmentKind::Home => "home",
            AdjustmentKind::Opponent => "opponent",
            AdjustmentKind::Venue => "venue",
            AdjustmentKind::Weather => "weather",
            AdjustmentKind::Rest => "rest",
            AdjustmentKind::GameScript => "game_script",
        }
    }

    pub fn multiplier(
        &self,
        features: &FeatureVector,
        context: &PropContext,
        config: &AdjustmentConfig,
    ) -> f64 {
        match self {
            AdjustmentKind::Streak => streak(features, config),
            AdjustmentKind::Momentum => momentum(features, config),
            AdjustmentKind::Form => form(features, config),
            AdjustmentKind::Home => {
                if context.is_home {
                    config.home
                } else {
                    1.0
                }
            }
            AdjustmentKind::Opponent => context.factors.opponent,
            AdjustmentKind::Venue => context.factors.venue,
            AdjustmentKind::Weather => context.factors.weather,
            AdjustmentKind::Rest => context.factors.rest,
            AdjustmentKind::GameScript => context.factors.game_script,
        }
    }
}

fn streak(features: &FeatureVector, config: &AdjustmentConfig) -> f64 {
    let s = features.form.current_streak;
    if s >= config.streak_length {
        config.hot_streak
    } else if s <= -config.streak_length {
        config.cold_streak
    } else {
        1.0
    }
}

fn momentum(features: &FeatureVector, config: &AdjustmentConfig) -> f64 {
    let delta = features.form.momentum - features.rates.season;
    if delta >= config.momentum_edge {
        config.momentum_up
    } else if delta <= -config.momentum_edge {
        config.momentum_down
    } else {
        1.0
    }
}

fn form(features: &FeatureVector, config: &AdjustmentConfig) -> f64 {
    let season = features.volume.avg_season;
    let short = features.volume.avg_short;
    if season <= 0.0 {
        return 1.0;
    }
    if short > season * config.form_hot_ratio {
        config.form_hot
    } else if short < season * config.form_cold_ratio {
        config.form_cold
    } else {
        1.0
    }
}

/// One non-neutral multiplier that was applied, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedAdjustment {
    pub name: String,
    pub multiplier: f64,
}

/// Fold `pipeline` over `base`, returning the adjusted value and the
/// multipliers that moved it.
pub fn apply_pipeline(
    base: f64,
    pipeline: &[AdjustmentKind],
    features: &FeatureVector,
    context: &PropContext,
    config: &AdjustmentConfig,
) -> (f64, Vec<AppliedAdjustment>) {
    pipeline
        .iter()
        .fold((base, Vec::new()), |(value, mut applied), kind| {
            let m = kind.multiplier(features, context, config);
            if m != 1.0 {
                applied.push(AppliedAdjustment {
                    name: kind.name().to_string(),
                    multiplier: m,
                });
            }
            (value * m, applied)
        })
}
