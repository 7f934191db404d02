use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::Database;
use crate::error::EngineError;
use crate::feeds::SlateProvider;
use crate::model::adjustments::PropContext;
use crate::model::calibration::CalibrationMode;
use crate::model::config::ModelConfig;
use crate::model::predictor::PropPredictor;

/// Counters for one daily prediction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub date: Option<NaiveDate>,
    pub batch_id: String,
    /// Predictions already existed and `force` was off; nothing was done.
    pub skipped_existing: bool,
    /// Ungraded predictions removed by a forced rerun.
    pub deleted: usize,
    pub players: usize,
    pub props: usize,
    pub generated: usize,
    pub insufficient_data: usize,
    pub duplicates: usize,
    pub unknown_stat: usize,
    pub invalid_context: usize,
    /// Slate entries dated for another day.
    pub off_date: usize,
}

impl BatchSummary {
    pub fn log(&self) {
        let date = self
            .date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        if self.skipped_existing {
            info!("Predictions already exist for {}; rerun with --force to regenerate", date);
            return;
        }
        info!(
            "Batch {} for {}: {} generated from {} props across {} players",
            self.batch_id, date, self.generated, self.props, self.players
        );
        info!(
            "  skipped: {} insufficient data, {} duplicates, {} unknown stat, {} invalid context, {} off-date",
            self.insufficient_data,
            self.duplicates,
            self.unknown_stat,
            self.invalid_context,
            self.off_date
        );
    }
}

/// Daily runner: slate in, persisted predictions out.
pub struct BatchRunner<'a> {
    db: &'a Database,
    config: &'a ModelConfig,
    mode: CalibrationMode,
    model_version: String,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        db: &'a Database,
        config: &'a ModelConfig,
        mode: CalibrationMode,
        model_version: &str,
    ) -> Self {
        BatchRunner {
            db,
            config,
            mode,
            model_version: model_version.to_string(),
        }
    }

    /// Predict every prop on `date`'s slate.
    ///
    /// A date that already has predictions is left alone unless `force`,
    /// which first clears the date's ungraded predictions. Per-prop
    /// problems are counted and skipped; a temporal-safety violation or a
    /// store failure aborts the whole batch.
    pub async fn run(
        &self,
        date: NaiveDate,
        slate: &dyn SlateProvider,
        force: bool,
    ) -> Result<BatchSummary> {
        let predictor = PropPredictor::new(self.db, self.config, self.mode, &self.model_version);
        let mut summary = BatchSummary {
            date: Some(date),
            batch_id: predictor.batch_id().to_string(),
            ..BatchSummary::default()
        };

        let existing = self.db.count_predictions(date)?;
        if existing > 0 {
            if !force {
                summary.skipped_existing = true;
                return Ok(summary);
            }
            summary.deleted = self.db.delete_ungraded_predictions(date)?;
            info!("Force: removed {} ungraded predictions for {}", summary.deleted, date);
        }

        let entries = match slate.fetch_slate(date).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("{} slate fetch for {} failed: {:#}", slate.name(), date, e);
                Vec::new()
            }
        };
        info!("Slate for {}: {} players from {}", date, entries.len(), slate.name());

        for entry in &entries {
            if entry.game_date != date {
                summary.off_date += 1;
                continue;
            }
            summary.players += 1;
            let context = PropContext {
                is_home: entry.is_home,
                team: Some(entry.team.clone()),
                opponent: Some(entry.opponent.clone()),
                factors: entry.factors,
            };

            for prop in &entry.props {
                summary.props += 1;
                let prediction = match predictor.predict(
                    &entry.player,
                    &prop.stat_type,
                    prop.line,
                    date,
                    &context,
                ) {
                    Ok(Some(p)) => p,
                    Ok(None) => {
                        summary.insufficient_data += 1;
                        continue;
                    }
                    Err(e) => match e.downcast_ref::<EngineError>() {
                        Some(EngineError::UnknownStatType(stat)) => {
                            warn!("Unknown stat type '{}' for {}", stat, entry.player);
                            summary.unknown_stat += 1;
                            continue;
                        }
                        Some(EngineError::InvalidContext { .. }) => {
                            warn!("{}: {}", entry.player, e);
                            summary.invalid_context += 1;
                            continue;
                        }
                        _ => return Err(e.context(format!("batch for {} aborted", date))),
                    },
                };

                if self.db.insert_prediction(&prediction)? {
                    summary.generated += 1;
                } else {
                    summary.duplicates += 1;
                }
            }
        }

        Ok(summary)
    }
}
