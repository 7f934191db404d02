use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

use crate::db::models::Prediction;
use crate::features::{FeatureExtractor, FeatureVector, HistorySource};
use crate::model::adjustments::{AppliedAdjustment, PropContext};
use crate::model::calibration::{CalibrationConfig, CalibrationMode};
use crate::model::config::ModelConfig;
use crate::model::engine::{decide, ProbabilityEngine};
use crate::model::stat_types::StatCatalog;

/// Batch identifier shared by every prediction of one run.
pub fn new_batch_id() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// What gets serialized into `features_json` next to the prediction.
#[derive(Debug, Serialize)]
struct Diagnostics<'a> {
    features: &'a FeatureVector,
    model: &'static str,
    expected: f64,
    spread: Option<f64>,
    raw_probability: f64,
    capped_probability: f64,
    adjustments: &'a [AppliedAdjustment],
}

/// Extraction, probability, calibration: one call per (player, stat, line).
pub struct PropPredictor<H> {
    extractor: FeatureExtractor<H>,
    engine: ProbabilityEngine,
    calibration: CalibrationConfig,
    catalog: StatCatalog,
    mode: CalibrationMode,
    model_version: String,
    batch_id: String,
}

impl<H: HistorySource> PropPredictor<H> {
    pub fn new(source: H, config: &ModelConfig, mode: CalibrationMode, model_version: &str) -> Self {
        PropPredictor {
            extractor: FeatureExtractor::new(source, config.extractor.clone()),
            engine: ProbabilityEngine::new(config.engine.clone(), config.adjustments.clone()),
            calibration: config.calibration.clone(),
            catalog: config.catalog.clone(),
            mode,
            model_version: model_version.to_string(),
            batch_id: new_batch_id(),
        }
    }

    #[cfg(test)]
    pub fn with_batch_id(mut self, batch_id: &str) -> Self {
        self.batch_id = batch_id.to_string();
        self
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    /// Predict one prop line for a game on `as_of`.
    ///
    /// `Ok(None)` means too little history: skip, do not persist. Unknown
    /// stat types, bad context factors and temporal violations are errors.
    pub fn predict(
        &self,
        player: &str,
        stat_type: &str,
        line: f64,
        as_of: NaiveDate,
        context: &PropContext,
    ) -> Result<Option<Prediction>> {
        let spec = self.catalog.require(stat_type)?;
        let features = self.extractor.extract(player, as_of, context, spec)?;

        let Some(output) = self.engine.predict(&features, line, spec, context)? else {
            debug!(
                player,
                stat_type,
                games = features.games_played,
                "insufficient history, skipping"
            );
            return Ok(None);
        };

        let (capped, tier) = self.calibration.calibrate(output.over_probability, self.mode);
        let (side, confidence) = decide(spec.family, capped);

        let features_json = serde_json::to_string(&Diagnostics {
            features: &features,
            model: spec.family.as_str(),
            expected: output.expected,
            spread: output.spread,
            raw_probability: output.over_probability,
            capped_probability: capped,
            adjustments: &output.adjustments,
        })?;

        debug!(
            player,
            stat_type,
            line,
            raw = output.over_probability,
            capped,
            side = %side,
            tier = %tier,
            "prediction"
        );

        Ok(Some(Prediction {
            id: None,
            game_date: as_of,
            player: player.to_string(),
            team: context.team.clone().unwrap_or_default(),
            opponent: context.opponent.clone().unwrap_or_default(),
            stat_type: stat_type.to_string(),
            line,
            side,
            probability: capped,
            confidence,
            tier,
            model_version: self.model_version.clone(),
            batch_id: self.batch_id.clone(),
            features_json,
            created_at: Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{GameObservation, Side};
    use crate::db::Database;
    use crate::error::EngineError;
    use crate::model::calibration::ConfidenceTier;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed(db: &Database, player: &str, shots: &[f64], points: &[f64]) {
        let catalog = StatCatalog::nhl();
        for (i, (s, p)) in shots.iter().zip(points).enumerate() {
            let stats: BTreeMap<String, f64> =
                [("shots".to_string(), *s), ("points".to_string(), *p)]
                    .into_iter()
                    .collect();
            db.upsert_game_observation(&GameObservation {
                id: None,
                player: player.into(),
                team: "TOR".into(),
                opponent: "MTL".into(),
                game_id: format!("g{}", i),
                game_date: date(2025, 11, 30) - chrono::Duration::days(i as i64),
                is_home: i % 2 == 0,
                targets: catalog.derive_targets(&stats),
                stats,
            })
            .unwrap();
        }
    }

    fn predictor(db: &Database) -> PropPredictor<&Database> {
        PropPredictor::new(db, &ModelConfig::nhl(), CalibrationMode::Learning, "test-v1")
            .with_batch_id("20251201_120000")
    }

    #[test]
    fn hot_scorer_is_capped_to_learning_band() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "Auston Matthews", &[6.0; 12], &[2.0; 12]);
        let p = predictor(&db)
            .predict("Auston Matthews", "points", 0.5, date(2025, 12, 1), &PropContext::default())
            .unwrap()
            .unwrap();
        assert_eq!(p.side, Side::Yes);
        assert_eq!(p.probability, 0.70);
        assert_eq!(p.confidence, 0.70);
        assert_eq!(p.tier, ConfidenceTier::T2Strong);
        assert_eq!(p.batch_id, "20251201_120000");
        assert_eq!(p.model_version, "test-v1");
    }

    #[test]
    fn cold_shooter_predicts_under() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "Ryan Reaves", &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0], &[0.0; 8]);
        let ctx = PropContext {
            team: Some("TOR".into()),
            opponent: Some("MTL".into()),
            ..PropContext::default()
        };
        let p = predictor(&db)
            .predict("Ryan Reaves", "shots", 2.5, date(2025, 12, 1), &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(p.side, Side::Under);
        assert!(p.probability < 0.5);
        assert!(p.probability >= 0.30);
        assert_eq!(p.team, "TOR");
        assert_eq!(p.opponent, "MTL");
    }

    #[test]
    fn short_history_is_skipped() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "Easton Cowan", &[3.0, 2.0, 4.0], &[1.0, 0.0, 1.0]);
        let p = predictor(&db)
            .predict("Easton Cowan", "shots", 2.5, date(2025, 12, 1), &PropContext::default())
            .unwrap();
        assert!(p.is_none());
    }

    #[test]
    fn unknown_stat_type_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        let err = predictor(&db)
            .predict("Anyone", "penalty_minutes", 1.5, date(2025, 12, 1), &PropContext::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::UnknownStatType(_))
        ));
    }

    #[test]
    fn features_json_carries_diagnostics() {
        let db = Database::open_in_memory().unwrap();
        seed(&db, "William Nylander", &[4.0, 3.0, 5.0, 2.0, 4.0, 3.0], &[1.0; 6]);
        let p = predictor(&db)
            .predict("William Nylander", "shots", 3.5, date(2025, 12, 1), &PropContext::default())
            .unwrap()
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&p.features_json).unwrap();
        assert_eq!(v["model"], "normal");
        assert_eq!(v["features"]["games_played"], 6);
        assert!(v["spread"].as_f64().unwrap() >= 0.5);
        assert!(v["raw_probability"].is_number());
        assert_relative_eq!(
            v["capped_probability"].as_f64().unwrap(),
            p.probability,
            epsilon = 1e-12
        );
    }
}
