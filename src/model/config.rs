use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::features::ExtractorConfig;
use crate::model::adjustments::AdjustmentConfig;
use crate::model::calibration::{Band, CalibrationConfig};
use crate::model::engine::EngineConfig;
use crate::model::stat_types::StatCatalog;

/// Immutable per-sport model configuration.
///
/// Built once at startup (preset or JSON file) and handed by reference to
/// the extractor, engine and calibrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub sport: String,
    pub catalog: StatCatalog,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub adjustments: AdjustmentConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::nhl()
    }
}

impl ModelConfig {
    fn preset(sport: &str, catalog: StatCatalog) -> Self {
        ModelConfig {
            sport: sport.to_string(),
            catalog,
            extractor: ExtractorConfig::default(),
            engine: EngineConfig::default(),
            adjustments: AdjustmentConfig::default(),
            calibration: CalibrationConfig::default(),
        }
    }

    pub fn nhl() -> Self {
        Self::preset("nhl", StatCatalog::nhl())
    }

    pub fn nba() -> Self {
        Self::preset("nba", StatCatalog::nba())
    }

    /// Baseball runs a tighter learning band and wants more history.
    pub fn mlb() -> Self {
        let mut cfg = Self::preset("mlb", StatCatalog::mlb());
        cfg.calibration.learning_band = Band { min: 0.35, max: 0.65 };
        cfg.extractor.min_games = 10;
        cfg
    }

    pub fn nfl() -> Self {
        let mut cfg = Self::preset("nfl", StatCatalog::nfl());
        // One game a week: a season is ~17 games
        cfg.extractor.windows.long = 12;
        cfg.extractor.windows.recent = 6;
        cfg.extractor.windows.short = 4;
        cfg.extractor.min_games = 3;
        cfg
    }

    pub fn for_sport(sport: &str) -> Result<Self> {
        match sport.to_lowercase().as_str() {
            "nhl" => Ok(Self::nhl()),
            "nba" => Ok(Self::nba()),
            "mlb" => Ok(Self::mlb()),
            "nfl" => Ok(Self::nfl()),
            other => anyhow::bail!("unknown sport '{}' (expected nhl, nba, mlb or nfl)", other),
        }
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model config {}", path.display()))?;
        let cfg: ModelConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse model config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.catalog.is_empty() {
            anyhow::bail!("model config for {} has no stat types", self.sport);
        }
        for spec in self.catalog.iter() {
            if !(spec.std_floor > 0.0) {
                anyhow::bail!("stat {} needs a positive std_floor", spec.name);
            }
            if !(0.0..=1.0).contains(&spec.league_rate) {
                anyhow::bail!("stat {} league_rate must be in [0, 1]", spec.name);
            }
        }

        let w = &self.extractor.windows;
        if [w.long, w.recent, w.short, w.micro].contains(&0)
            || self.extractor.momentum_window == 0
            || self.extractor.trend_window == 0
        {
            anyhow::bail!("extractor windows must be > 0");
        }
        if !(self.extractor.momentum_decay > 0.0) || !(self.extractor.trend_scale > 0.0) {
            anyhow::bail!("momentum_decay and trend_scale must be > 0");
        }
        if self.extractor.min_games == 0 {
            anyhow::bail!("min_games must be > 0");
        }
        if !(0.0..=1.0).contains(&self.engine.recent_weight) {
            anyhow::bail!("recent_weight must be in [0, 1]");
        }
        self.calibration.validate()
    }
}
