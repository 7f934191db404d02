use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::model::{CalibrationMode, ModelConfig};

/// Temporal-safe player prop prediction engine
#[derive(Parser, Debug, Clone)]
#[command(name = "propline", version, about)]
pub struct Config {
    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "propline.db")]
    pub database_path: String,

    /// Sport preset (nhl, nba, mlb, nfl); ignored when --model-config is set
    #[arg(long, env = "SPORT", default_value = "nhl")]
    pub sport: String,

    /// JSON model configuration overriding the sport preset
    #[arg(long, env = "MODEL_CONFIG")]
    pub model_config: Option<PathBuf>,

    /// Clamp probabilities into the conservative learning band
    #[arg(long, env = "LEARNING_MODE", default_value_t = true, action = clap::ArgAction::Set)]
    pub learning_mode: bool,

    /// Version tag stored on every prediction
    #[arg(long, env = "MODEL_VERSION", default_value = "stat-v1")]
    pub model_version: String,

    /// Directory holding slate/<date>.json and results/<date>.json
    #[arg(long, env = "FEED_DIR")]
    pub feed_dir: Option<PathBuf>,

    /// Base URL serving /slate/<date> and /results/<date>
    #[arg(long, env = "FEED_URL")]
    pub feed_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Generate predictions for a date's slate
    Predict {
        /// Game date (YYYY-MM-DD), defaults to today (UTC)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Delete the date's ungraded predictions and regenerate
        #[arg(long, default_value = "false")]
        force: bool,
    },

    /// Grade a date's predictions and append its box scores to the game log
    Grade {
        /// Game date (YYYY-MM-DD), defaults to yesterday (UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Bulk-load historical box scores (a JSON array of result lines)
    Ingest {
        #[arg(long)]
        file: PathBuf,
    },

    /// Accuracy by confidence tier over every graded prediction
    Report {
        /// Also list the graded outcomes of this date
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_path.trim().is_empty() {
            anyhow::bail!("DATABASE_PATH must not be empty");
        }
        if self.model_version.trim().is_empty() {
            anyhow::bail!("MODEL_VERSION must not be empty");
        }
        match &self.command {
            Command::Predict { .. } | Command::Grade { .. } => {
                match (&self.feed_dir, &self.feed_url) {
                    (None, None) => {
                        anyhow::bail!("one of FEED_DIR or FEED_URL is required for this command")
                    }
                    (Some(_), Some(_)) => anyhow::bail!("set only one of FEED_DIR or FEED_URL"),
                    _ => {}
                }
            }
            Command::Ingest { file } => {
                if !file.is_file() {
                    anyhow::bail!("ingest file {} does not exist", file.display());
                }
            }
            Command::Report { .. } => {}
        }
        Ok(())
    }

    pub fn calibration_mode(&self) -> CalibrationMode {
        CalibrationMode::from_learning_flag(self.learning_mode)
    }

    /// The JSON model config when given, else the sport preset.
    pub fn load_model(&self) -> Result<ModelConfig> {
        let model = match &self.model_config {
            Some(path) => ModelConfig::load_json(path)?,
            None => ModelConfig::for_sport(&self.sport)?,
        };
        model.validate()?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("propline").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn predict_requires_exactly_one_feed() {
        let cfg = parse(&["predict", "--date", "2025-11-10"]);
        assert!(cfg.validate().is_err());

        let cfg = parse(&["--feed-dir", "/tmp/feeds", "predict", "--date", "2025-11-10"]);
        assert!(cfg.validate().is_ok());
        match cfg.command {
            Command::Predict { date, force } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2025, 11, 10));
                assert!(!force);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cfg = parse(&["--feed-dir", "/tmp/feeds", "--feed-url", "http://x", "grade"]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn learning_mode_defaults_on_and_can_be_disabled() {
        let cfg = parse(&["report"]);
        assert_eq!(cfg.calibration_mode(), CalibrationMode::Learning);
        let cfg = parse(&["--learning-mode", "false", "report"]);
        assert_eq!(cfg.calibration_mode(), CalibrationMode::Production);
    }

    #[test]
    fn sport_preset_is_loaded() {
        let cfg = parse(&["--sport", "mlb", "report"]);
        let model = cfg.load_model().unwrap();
        assert_eq!(model.sport, "mlb");
        let cfg = parse(&["--sport", "cricket", "report"]);
        assert!(cfg.load_model().is_err());
    }
}
