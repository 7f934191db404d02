//! Resolve a date's predictions against final box scores and feed every
//! box-score line back into the game log.

pub mod matching;

use matching::{NameIndex, NameMatch};

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::db::models::{Outcome, OutcomeResult, PlayerResult, Prediction, Side};
use crate::db::Database;
use crate::feeds::ResultsProvider;
use crate::model::stat_types::StatCatalog;

/// OVER/YES hits above the line, UNDER/NO below it; landing on the line pushes.
pub fn resolve_result(side: Side, actual: f64, line: f64) -> OutcomeResult {
    if actual == line {
        return OutcomeResult::Push;
    }
    let hit = if side.is_over() {
        actual > line
    } else {
        actual < line
    };
    if hit {
        OutcomeResult::Hit
    } else {
        OutcomeResult::Miss
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    pub graded: usize,
    pub hits: usize,
    pub pushes: usize,
}

impl Tally {
    fn record(&mut self, result: OutcomeResult) {
        self.graded += 1;
        match result {
            OutcomeResult::Hit => self.hits += 1,
            OutcomeResult::Push => self.pushes += 1,
            OutcomeResult::Miss => {}
        }
    }

    /// Hit rate over decided (non-push) outcomes.
    pub fn accuracy(&self) -> Option<f64> {
        let decided = self.graded - self.pushes;
        (decided > 0).then(|| self.hits as f64 / decided as f64)
    }
}

/// Summary of one grading pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradingReport {
    pub date: Option<NaiveDate>,
    pub results_fetched: usize,
    pub observations_written: usize,
    /// Predictions whose player was found in the results feed this pass.
    pub matched: usize,
    pub unmatched: Vec<String>,
    pub ambiguous: Vec<String>,
    /// Player found, but the feed line lacks the stat.
    pub missing_stat: Vec<String>,
    pub already_graded: usize,
    /// Outcomes written this pass.
    pub total: usize,
    pub hits: usize,
    pub pushes: usize,
    pub by_tier: BTreeMap<String, Tally>,
    pub by_stat_type: BTreeMap<String, Tally>,
    pub by_match_tier: BTreeMap<String, usize>,
}

impl GradingReport {
    pub fn accuracy(&self) -> Option<f64> {
        let decided = self.total - self.pushes;
        (decided > 0).then(|| self.hits as f64 / decided as f64)
    }

    pub fn log(&self) {
        let date = self
            .date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        info!(
            "Grading {}: {} results, {} observations written, {} graded ({} hits, {} pushes), {} already graded",
            date,
            self.results_fetched,
            self.observations_written,
            self.total,
            self.hits,
            self.pushes,
            self.already_graded
        );
        if let Some(acc) = self.accuracy() {
            info!("Accuracy {}: {:.1}%", date, acc * 100.0);
        }
        for (tier, t) in &self.by_tier {
            match t.accuracy() {
                Some(acc) => info!(
                    "  {}: {}/{} hits ({:.1}%), {} pushes",
                    tier,
                    t.hits,
                    t.graded - t.pushes,
                    acc * 100.0,
                    t.pushes
                ),
                None => info!("  {}: {} pushes", tier, t.pushes),
            }
        }
        if !self.unmatched.is_empty() {
            warn!("Unmatched players ({}): {}", self.unmatched.len(), self.unmatched.join(", "));
        }
        if !self.ambiguous.is_empty() {
            warn!("Ambiguous players ({}): {}", self.ambiguous.len(), self.ambiguous.join(", "));
        }
        if !self.missing_stat.is_empty() {
            warn!("Missing stats: {}", self.missing_stat.join(", "));
        }
    }
}

pub struct Grader<'a> {
    db: &'a Database,
    catalog: &'a StatCatalog,
}

impl<'a> Grader<'a> {
    pub fn new(db: &'a Database, catalog: &'a StatCatalog) -> Self {
        Grader { db, catalog }
    }

    /// Grade every ungraded prediction for `date` and append the day's box
    /// scores to the game log, committing both together.
    ///
    /// A failing feed counts as "no results yet": the report shows zero
    /// resolved and nothing is written.
    pub async fn grade(&self, date: NaiveDate, feed: &dyn ResultsProvider) -> Result<GradingReport> {
        let results = match feed.fetch_results(date).await {
            Ok(r) => r,
            Err(e) => {
                warn!("{} results fetch for {} failed: {:#}", feed.name(), date, e);
                Vec::new()
            }
        };
        let mut report = GradingReport {
            date: Some(date),
            results_fetched: results.len(),
            ..GradingReport::default()
        };

        let mut observations: Vec<_> = results
            .iter()
            .map(|r| self.catalog.observation_from_result(r))
            .collect();

        let predictions = self.db.predictions_for_date(date)?;
        let graded = self.db.graded_prediction_ids(date)?;
        let index = NameIndex::new(results.iter().map(|r| (r.player.as_str(), r.team.as_str())));

        let mut pending: Vec<(&Prediction, Outcome)> = Vec::new();
        for p in &predictions {
            let Some(id) = p.id else { continue };
            let team = (!p.team.is_empty()).then_some(p.team.as_str());
            let resolved = index.resolve(&p.player, team);
            if let NameMatch::Found { index: i, .. } = resolved {
                // The game log is keyed by the slate's spelling
                observations[i].player = p.player.clone();
            }
            if graded.contains(&id) {
                report.already_graded += 1;
                continue;
            }
            match resolved {
                NameMatch::Found { index: i, tier } => {
                    report.matched += 1;
                    let row = &results[i];
                    match self.actual_value(p, row) {
                        Some(actual) => pending.push((p, Outcome {
                            id: None,
                            prediction_id: id,
                            game_date: date,
                            player: p.player.clone(),
                            stat_type: p.stat_type.clone(),
                            line: p.line,
                            predicted: p.side,
                            actual_value: actual,
                            result: resolve_result(p.side, actual, p.line),
                            match_tier: tier.as_str().to_string(),
                            matched_name: row.player.clone(),
                            graded_at: Utc::now(),
                        })),
                        None => report
                            .missing_stat
                            .push(format!("{} {}", p.player, p.stat_type)),
                    }
                }
                NameMatch::Ambiguous { tier, names } => {
                    warn!(
                        "Ambiguous {} match for {}: {}",
                        tier.as_str(),
                        p.player,
                        names.join(" | ")
                    );
                    report.ambiguous.push(p.player.clone());
                }
                NameMatch::NotFound => report.unmatched.push(p.player.clone()),
            }
        }
        report.unmatched.dedup();
        report.ambiguous.dedup();

        let outcomes: Vec<Outcome> = pending.iter().map(|(_, o)| o.clone()).collect();
        let (written, inserted) = self.db.commit_grading(&observations, &outcomes)?;
        report.observations_written = written;
        if inserted != outcomes.len() {
            // Another grader got there between our read and our commit
            warn!(
                "{} of {} outcomes for {} were already present",
                outcomes.len() - inserted,
                outcomes.len(),
                date
            );
        }

        for (p, o) in &pending {
            record(&mut report, o, p);
        }
        Ok(report)
    }

    fn actual_value(&self, p: &Prediction, row: &PlayerResult) -> Option<f64> {
        match self.catalog.get(&p.stat_type) {
            Some(spec) => spec.value(&row.stats),
            None => row.stats.get(&p.stat_type).copied(),
        }
    }
}

fn record(report: &mut GradingReport, o: &Outcome, p: &Prediction) {
    report.total += 1;
    match o.result {
        OutcomeResult::Hit => report.hits += 1,
        OutcomeResult::Push => report.pushes += 1,
        OutcomeResult::Miss => {}
    }
    report
        .by_tier
        .entry(p.tier.as_str().to_string())
        .or_default()
        .record(o.result);
    report
        .by_stat_type
        .entry(p.stat_type.clone())
        .or_default()
        .record(o.result);
    *report.by_match_tier.entry(o.match_tier.clone()).or_default() += 1;
}
