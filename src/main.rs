use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::Parser;
use tracing::{info, warn};

mod config;
mod db;
mod error;
mod features;
mod feeds;
mod grading;
mod model;

use config::{Command, Config};
use db::models::PlayerResult;
use db::Database;
use feeds::{read_json_list, HttpFeed, JsonDirFeed, ResultsProvider, SlateProvider};
use grading::Grader;
use model::{BatchRunner, ModelConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let model = config.load_model()?;
    info!(
        "Model: {} ({} stat types, {:?} calibration, version {})",
        model.sport,
        model.catalog.len(),
        config.calibration_mode(),
        config.model_version
    );

    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    match config.command.clone() {
        Command::Predict { date, force } => {
            let date = date.unwrap_or_else(today);
            let slate = slate_provider(&config)?;
            let runner =
                BatchRunner::new(&db, &model, config.calibration_mode(), &config.model_version);
            let summary = runner.run(date, slate.as_ref(), force).await?;
            summary.log();
        }
        Command::Grade { date } => {
            let date = date.unwrap_or_else(|| today() - Duration::days(1));
            let results = results_provider(&config)?;
            let report = Grader::new(&db, &model.catalog)
                .grade(date, results.as_ref())
                .await?;
            report.log();
        }
        Command::Ingest { file } => ingest(&db, &model, &file).await?,
        Command::Report { date } => report(&db, date)?,
    }

    Ok(())
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn slate_provider(config: &Config) -> Result<Box<dyn SlateProvider>> {
    match (&config.feed_dir, &config.feed_url) {
        (Some(dir), _) => Ok(Box::new(JsonDirFeed::new(dir.clone()))),
        (None, Some(url)) => Ok(Box::new(HttpFeed::new(url)?)),
        (None, None) => anyhow::bail!("no feed configured"),
    }
}

fn results_provider(config: &Config) -> Result<Box<dyn ResultsProvider>> {
    match (&config.feed_dir, &config.feed_url) {
        (Some(dir), _) => Ok(Box::new(JsonDirFeed::new(dir.clone()))),
        (None, Some(url)) => Ok(Box::new(HttpFeed::new(url)?)),
        (None, None) => anyhow::bail!("no feed configured"),
    }
}

/// Bulk-load historical box scores into the game log.
async fn ingest(db: &Database, model: &ModelConfig, file: &std::path::Path) -> Result<()> {
    let results: Vec<PlayerResult> = read_json_list(file)
        .await
        .with_context(|| format!("Failed to load {}", file.display()))?;
    if results.is_empty() {
        warn!("{} holds no results", file.display());
        return Ok(());
    }

    let observations: Vec<_> = results
        .iter()
        .map(|r| model.catalog.observation_from_result(r))
        .collect();
    let written = db.upsert_game_observations(&observations)?;
    info!(
        "Ingested {} game observations from {} ({} rows in game log)",
        written,
        file.display(),
        db.count_game_observations()?
    );
    Ok(())
}

fn report(db: &Database, date: Option<NaiveDate>) -> Result<()> {
    let tiers = db.accuracy_by_tier()?;
    if tiers.is_empty() {
        info!("No graded predictions yet");
    }
    for t in &tiers {
        match t.accuracy() {
            Some(acc) => info!(
                "{:<10} {:>5} hit {:>5} miss {:>4} push  {:.1}%",
                t.tier,
                t.hits,
                t.misses,
                t.pushes,
                acc * 100.0
            ),
            None => info!("{:<10} {:>4} push, nothing decided", t.tier, t.pushes),
        }
    }
    let hits: i64 = tiers.iter().map(|t| t.hits).sum();
    let misses: i64 = tiers.iter().map(|t| t.misses).sum();
    if hits + misses > 0 {
        info!(
            "Overall: {}/{} ({:.1}%)",
            hits,
            hits + misses,
            hits as f64 / (hits + misses) as f64 * 100.0
        );
    }

    if let Some(date) = date {
        let outcomes = db.outcomes_for_date(date)?;
        info!("{} graded outcomes for {}", outcomes.len(), date);
        for o in &outcomes {
            info!(
                "  {:<4} {} {} {} {} (actual {}, matched '{}' via {})",
                o.result.as_str(),
                o.player,
                o.stat_type,
                o.predicted,
                o.line,
                o.actual_value,
                o.matched_name,
                o.match_tier
            );
        }
    }
    Ok(())
}
