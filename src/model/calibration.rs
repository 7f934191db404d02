//! Probability capping and confidence tiering.
//!
//! In learning mode the raw OVER/YES probability is squeezed into a narrow
//! band around 0.5; production mode uses a wider band and unlocks the elite
//! tier. The tier is a step function of the capped probability's distance
//! from a coin flip.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Slack on tier edges so 0.60 lands in the 0.10 tier despite `0.60 - 0.5 < 0.10` in f64.
const TIER_EDGE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceTier {
    #[serde(rename = "T1-ELITE")]
    T1Elite,
    #[serde(rename = "T2-STRONG")]
    T2Strong,
    #[serde(rename = "T3-GOOD")]
    T3Good,
    #[serde(rename = "T4-LEAN")]
    T4Lean,
    #[serde(rename = "T5-FADE")]
    T5Fade,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::T1Elite => "T1-ELITE",
            ConfidenceTier::T2Strong => "T2-STRONG",
            ConfidenceTier::T3Good => "T3-GOOD",
            ConfidenceTier::T4Lean => "T4-LEAN",
            ConfidenceTier::T5Fade => "T5-FADE",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfidenceTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "T1-ELITE" => Ok(ConfidenceTier::T1Elite),
            "T2-STRONG" => Ok(ConfidenceTier::T2Strong),
            "T3-GOOD" => Ok(ConfidenceTier::T3Good),
            "T4-LEAN" => Ok(ConfidenceTier::T4Lean),
            "T5-FADE" => Ok(ConfidenceTier::T5Fade),
            other => anyhow::bail!("unknown confidence tier '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationMode {
    Learning,
    Production,
}

impl CalibrationMode {
    pub fn from_learning_flag(learning: bool) -> Self {
        if learning {
            CalibrationMode::Learning
        } else {
            CalibrationMode::Production
        }
    }
}

/// Inclusive probability band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub fn clamp(&self, p: f64) -> f64 {
        p.clamp(self.min, self.max)
    }

    pub fn contains(&self, p: f64) -> bool {
        p >= self.min && p <= self.max
    }
}

/// One step of a tier table: distance from 0.5 at or above which `tier` applies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierStep {
    pub min_edge: f64,
    pub tier: ConfidenceTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub learning_band: Band,
    pub production_band: Band,
    /// Checked top-down; the first step whose edge is reached wins.
    pub learning_tiers: Vec<TierStep>,
    pub production_tiers: Vec<TierStep>,
}

const fn step(min_edge: f64, tier: ConfidenceTier) -> TierStep {
    TierStep { min_edge, tier }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            learning_band: Band { min: 0.30, max: 0.70 },
            production_band: Band { min: 0.10, max: 0.95 },
            learning_tiers: vec![
                step(0.15, ConfidenceTier::T2Strong),
                step(0.10, ConfidenceTier::T3Good),
                step(0.05, ConfidenceTier::T4Lean),
            ],
            production_tiers: vec![
                step(0.25, ConfidenceTier::T1Elite),
                step(0.15, ConfidenceTier::T2Strong),
                step(0.10, ConfidenceTier::T3Good),
                step(0.05, ConfidenceTier::T4Lean),
            ],
        }
    }
}

impl CalibrationConfig {
    pub fn band(&self, mode: CalibrationMode) -> Band {
        match mode {
            CalibrationMode::Learning => self.learning_band,
            CalibrationMode::Production => self.production_band,
        }
    }

    fn tiers(&self, mode: CalibrationMode) -> &[TierStep] {
        match mode {
            CalibrationMode::Learning => &self.learning_tiers,
            CalibrationMode::Production => &self.production_tiers,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (label, band) in [
            ("learning", self.learning_band),
            ("production", self.production_band),
        ] {
            if !(0.0..=1.0).contains(&band.min) || !(0.0..=1.0).contains(&band.max) {
                anyhow::bail!("{} band [{}, {}] outside [0, 1]", label, band.min, band.max);
            }
            if !band.contains(0.5) {
                anyhow::bail!("{} band [{}, {}] must contain 0.5", label, band.min, band.max);
            }
        }
        for (label, tiers) in [
            ("learning", &self.learning_tiers),
            ("production", &self.production_tiers),
        ] {
            if tiers.windows(2).any(|w| w[0].min_edge <= w[1].min_edge) {
                anyhow::bail!("{} tier edges must be strictly decreasing", label);
            }
        }
        Ok(())
    }

    pub fn tier_for(&self, probability: f64, mode: CalibrationMode) -> ConfidenceTier {
        let edge = (probability - 0.5).abs();
        self.tiers(mode)
            .iter()
            .find(|s| edge + TIER_EDGE_TOLERANCE >= s.min_edge)
            .map(|s| s.tier)
            .unwrap_or(ConfidenceTier::T5Fade)
    }

    /// Cap `raw` into the mode's band and classify it.
    pub fn calibrate(&self, raw: f64, mode: CalibrationMode) -> (f64, ConfidenceTier) {
        // NaN would slip through clamp; treat it as a coin flip.
        let raw = if raw.is_nan() { 0.5 } else { raw };
        let capped = self.band(mode).clamp(raw);
        (capped, self.tier_for(capped, mode))
    }
}
