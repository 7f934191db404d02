use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::db::models::{PlayerResult, SlateEntry};

/// Source of the day's slate: who plays, against whom, and which lines to price.
#[async_trait]
pub trait SlateProvider: Send + Sync {
    async fn fetch_slate(&self, date: NaiveDate) -> Result<Vec<SlateEntry>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Source of final box-score lines for completed games.
#[async_trait]
pub trait ResultsProvider: Send + Sync {
    /// Every player line for games played on `date`. Games not yet final
    /// must be left out.
    async fn fetch_results(&self, date: NaiveDate) -> Result<Vec<PlayerResult>>;

    fn name(&self) -> &str;
}
