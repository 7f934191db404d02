//! Feature vector + line → raw OVER/YES probability.
//!
//! The base estimate depends on the stat's distribution family:
//!
//! - **Binary**: blended success rate, nudged by the binary adjustment pipeline.
//! - **Poisson**: blended per-game count gives λ; the count pipeline scales λ;
//!   P(over) = 1 − PoissonCDF(⌊line⌋; λ).
//! - **Normal**: blended average plus a trend shift gives μ; the count
//!   pipeline scales μ; σ is the blended spread floored per stat;
//!   P(over) = 1 − Φ((line − μ) / σ).

use serde::{Deserialize, Serialize};

use crate::db::models::Side;
use crate::error::EngineError;
use crate::features::FeatureVector;
use crate::model::adjustments::{
    apply_pipeline, pipeline_for, AdjustmentConfig, AppliedAdjustment, PropContext,
};
use crate::model::distribution;
use crate::model::stat_types::{DistributionFamily, StatSpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Weight of the recent window against the season; the season gets `1 - w`.
    pub recent_weight: f64,
    /// Normal μ shift per unit of normalised trend, in season standard deviations.
    pub trend_weight: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            recent_weight: 0.6,
            trend_weight: 0.25,
        }
    }
}

/// Everything the engine decided for one line, before calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    pub family: DistributionFamily,
    /// Raw P(OVER / YES), always within [0, 1].
    pub over_probability: f64,
    pub side: Side,
    pub confidence: f64,
    /// Adjusted success rate, λ or μ depending on family.
    pub expected: f64,
    /// σ for Normal stats.
    pub spread: Option<f64>,
    pub adjustments: Vec<AppliedAdjustment>,
}

/// Label and confidence for an OVER/YES probability. Ties go to the under side.
pub fn decide(family: DistributionFamily, over_probability: f64) -> (Side, f64) {
    let (over, under) = family.sides();
    if over_probability > 0.5 {
        (over, over_probability)
    } else {
        (under, 1.0 - over_probability)
    }
}

#[derive(Debug, Clone)]
pub struct ProbabilityEngine {
    config: EngineConfig,
    adjustments: AdjustmentConfig,
}

impl ProbabilityEngine {
    pub fn new(config: EngineConfig, adjustments: AdjustmentConfig) -> Self {
        ProbabilityEngine {
            config,
            adjustments,
        }
    }

    fn blend(&self, recent: f64, season: f64) -> f64 {
        let w = self.config.recent_weight;
        w * recent + (1.0 - w) * season
    }

    /// `Ok(None)` when the features are flagged insufficient: no prediction
    /// is made and nothing should be persisted.
    pub fn predict(
        &self,
        features: &FeatureVector,
        line: f64,
        spec: &StatSpec,
        context: &PropContext,
    ) -> Result<Option<EngineOutput>, EngineError> {
        if features.insufficient_data {
            return Ok(None);
        }
        context.factors.validate()?;

        let pipeline = pipeline_for(spec.family);
        let (over_probability, expected, spread, adjustments) = match spec.family {
            DistributionFamily::Binary => {
                let base = self.blend(features.rates.recent, features.rates.season);
                let (p, applied) =
                    apply_pipeline(base, pipeline, features, context, &self.adjustments);
                let p = p.clamp(0.0, 1.0);
                (p, p, None, applied)
            }
            DistributionFamily::Poisson => {
                let base = self.blend(features.volume.avg_short, features.volume.avg_season);
                let (lambda, applied) =
                    apply_pipeline(base.max(0.0), pipeline, features, context, &self.adjustments);
                let p = distribution::poisson_over(lambda, line)?;
                (p, lambda, None, applied)
            }
            DistributionFamily::Normal => {
                let v = &features.volume;
                let base = self.blend(v.avg_recent, v.avg_season)
                    + v.trend * self.config.trend_weight * v.std_season;
                let (mu, applied) =
                    apply_pipeline(base, pipeline, features, context, &self.adjustments);
                let sigma = self.blend(v.std_recent, v.std_season).max(spec.std_floor);
                let p = distribution::normal_over(mu, sigma, line)?;
                (p, mu, Some(sigma), applied)
            }
        };

        let (side, confidence) = decide(spec.family, over_probability);
        Ok(Some(EngineOutput {
            family: spec.family,
            over_probability,
            side,
            confidence,
            expected,
            spread,
            adjustments,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::adjustments::ContextFactors;
    use crate::model::stat_types::StatCatalog;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn engine() -> ProbabilityEngine {
        ProbabilityEngine::new(EngineConfig::default(), AdjustmentConfig::default())
    }

    fn ready(spec: &StatSpec) -> FeatureVector {
        let mut f = FeatureVector::league_default(spec, false);
        f.insufficient_data = false;
        f.games_played = 20;
        f
    }

    #[test]
    fn insufficient_data_yields_no_prediction() {
        let catalog = StatCatalog::nhl();
        let spec = catalog.get("points").unwrap();
        let f = FeatureVector::league_default(spec, false);
        let out = engine().predict(&f, 0.5, spec, &PropContext::default()).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn binary_blends_recent_and_season_rates() {
        let catalog = StatCatalog::nhl();
        let spec = catalog.get("points").unwrap();
        let mut f = ready(spec);
        f.rates.recent = 0.8;
        f.rates.season = 0.5;
        f.form.momentum = 0.5;
        let out = engine()
            .predict(&f, 0.5, spec, &PropContext::default())
            .unwrap()
            .unwrap();
        assert_relative_eq!(out.over_probability, 0.68, epsilon = 1e-12);
        assert_eq!(out.side, Side::Yes);
        assert_relative_eq!(out.confidence, 0.68, epsilon = 1e-12);
        assert!(out.adjustments.is_empty());
    }

    #[test]
    fn binary_hot_streak_is_capped_at_one() {
        let catalog = StatCatalog::nhl();
        let spec = catalog.get("points").unwrap();
        let mut f = ready(spec);
        f.rates.recent = 1.0;
        f.rates.season = 0.95;
        f.form.current_streak = 8;
        f.form.momentum = 1.0;
        let ctx = PropContext {
            is_home: true,
            ..PropContext::default()
        };
        let out = engine().predict(&f, 0.5, spec, &ctx).unwrap().unwrap();
        assert_eq!(out.over_probability, 1.0);
    }

    #[test]
    fn poisson_uses_blended_lambda() {
        let catalog = StatCatalog::mlb();
        let spec = catalog.get("pitcher_strikeouts").unwrap();
        let mut f = ready(spec);
        f.volume.avg_short = 6.0;
        f.volume.avg_season = 4.0;
        // avg_short vs season would trip the form nudge; neutralise it
        let adj = AdjustmentConfig {
            form_hot: 1.0,
            ..AdjustmentConfig::default()
        };
        let engine = ProbabilityEngine::new(EngineConfig::default(), adj);
        let out = engine.predict(&f, 5.5, spec, &PropContext::default()).unwrap().unwrap();
        assert_relative_eq!(out.expected, 5.2, epsilon = 1e-12);
        assert_relative_eq!(
            out.over_probability,
            distribution::poisson_over(5.2, 5.5).unwrap(),
            epsilon = 1e-12
        );
        assert_eq!(out.side, Side::Under);
    }

    #[test]
    fn poisson_lambda_scaled_by_context() {
        let catalog = StatCatalog::mlb();
        let spec = catalog.get("total_bases").unwrap();
        let f = ready(spec);
        let ctx = PropContext {
            factors: ContextFactors {
                venue: 1.2,
                weather: 1.1,
                ..ContextFactors::default()
            },
            ..PropContext::default()
        };
        let out = engine().predict(&f, 1.5, spec, &ctx).unwrap().unwrap();
        assert_relative_eq!(out.expected, 1.45 * 1.2 * 1.1, epsilon = 1e-12);
        assert_eq!(out.adjustments.len(), 2);
    }

    #[test]
    fn normal_uses_blended_mean_and_floored_sigma() {
        let catalog = StatCatalog::nhl();
        let spec = catalog.get("shots").unwrap();
        let mut f = ready(spec);
        f.volume.avg_recent = 4.0;
        f.volume.avg_season = 3.0;
        f.volume.avg_short = 3.0;
        f.volume.std_recent = 0.1;
        f.volume.std_season = 0.1;
        f.volume.trend = 0.0;
        let out = engine()
            .predict(&f, 2.5, spec, &PropContext::default())
            .unwrap()
            .unwrap();
        assert_relative_eq!(out.expected, 3.6, epsilon = 1e-12);
        assert_eq!(out.spread, Some(0.5));
        assert_relative_eq!(
            out.over_probability,
            distribution::normal_over(3.6, 0.5, 2.5).unwrap(),
            epsilon = 1e-12
        );
        assert_eq!(out.side, Side::Over);
    }

    #[test]
    fn invalid_context_is_rejected() {
        let catalog = StatCatalog::nhl();
        let spec = catalog.get("shots").unwrap();
        let f = ready(spec);
        let ctx = PropContext {
            factors: ContextFactors {
                opponent: -1.0,
                ..ContextFactors::default()
            },
            ..PropContext::default()
        };
        assert!(matches!(
            engine().predict(&f, 2.5, spec, &ctx),
            Err(EngineError::InvalidContext { name: "opponent", .. })
        ));
    }

    #[test]
    fn decide_breaks_ties_to_under() {
        assert_eq!(decide(DistributionFamily::Normal, 0.5), (Side::Under, 0.5));
        let (side, conf) = decide(DistributionFamily::Binary, 0.3);
        assert_eq!(side, Side::No);
        assert_relative_eq!(conf, 0.7);
    }

    proptest! {
        #[test]
        fn raw_probability_stays_in_unit_interval(
            recent in 0.0f64..1.0,
            season in 0.0f64..1.0,
            avg in 0.0f64..40.0,
            std in 0.0f64..15.0,
            trend in -1.0f64..1.0,
            streak in -10i32..10,
            line in -1.0f64..50.0,
            factor in 0.5f64..1.5,
            stat_idx in 0usize..6,
        ) {
            let catalog = StatCatalog::nba();
            let spec = catalog.iter().nth(stat_idx).unwrap().clone();
            let mut f = ready(&spec);
            f.rates.recent = recent;
            f.rates.season = season;
            f.volume.avg_recent = avg;
            f.volume.avg_short = avg * factor;
            f.volume.std_recent = std;
            f.volume.trend = trend;
            f.form.current_streak = streak;
            let ctx = PropContext {
                is_home: streak % 2 == 0,
                factors: ContextFactors { opponent: factor, ..ContextFactors::default() },
                ..PropContext::default()
            };
            let out = engine().predict(&f, line, &spec, &ctx).unwrap().unwrap();
            prop_assert!((0.0..=1.0).contains(&out.over_probability));
            prop_assert!(out.confidence >= 0.5);
        }
    }
}
