use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::db::models::{PlayerResult, SlateEntry};
use super::provider::{ResultsProvider, SlateProvider};

/// Feed backed by JSON files on disk, one file per date:
///
/// ```text
/// <root>/slate/2025-11-10.json     [SlateEntry, ...]
/// <root>/results/2025-11-10.json   [PlayerResult, ...]
/// ```
///
/// A missing file means nothing is scheduled / final for that date.
pub struct JsonDirFeed {
    root: PathBuf,
}

impl JsonDirFeed {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonDirFeed { root: root.into() }
    }

    fn path_for(&self, kind: &str, date: NaiveDate) -> PathBuf {
        self.root
            .join(kind)
            .join(format!("{}.json", date.format("%Y-%m-%d")))
    }
}

/// Read a JSON array file; a missing file is an empty list.
pub async fn read_json_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No feed file at {}", path.display());
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

#[async_trait]
impl SlateProvider for JsonDirFeed {
    fn name(&self) -> &str {
        "json-dir"
    }

    async fn fetch_slate(&self, date: NaiveDate) -> Result<Vec<SlateEntry>> {
        read_json_list(&self.path_for("slate", date)).await
    }
}

#[async_trait]
impl ResultsProvider for JsonDirFeed {
    fn name(&self) -> &str {
        "json-dir"
    }

    async fn fetch_results(&self, date: NaiveDate) -> Result<Vec<PlayerResult>> {
        read_json_list(&self.path_for("results", date)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("propline-feed-{}-{}", tag, std::process::id()));
        std::fs::create_dir_all(dir.join("slate")).unwrap();
        std::fs::create_dir_all(dir.join("results")).unwrap();
        dir
    }

    #[tokio::test]
    async fn missing_file_is_empty_feed() {
        let dir = scratch_dir("missing");
        let feed = JsonDirFeed::new(&dir);
        let date = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap();
        assert!(feed.fetch_results(date).await.unwrap().is_empty());
        assert!(feed.fetch_slate(date).await.unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn reads_slate_and_results() {
        let dir = scratch_dir("read");
        std::fs::write(
            dir.join("slate/2025-11-10.json"),
            r#"[{"player": "Connor McDavid", "team": "EDM", "opponent": "CGY",
                 "game_date": "2025-11-10", "is_home": true,
                 "factors": {"opponent": 1.05},
                 "props": [{"stat_type": "points", "line": 0.5},
                           {"stat_type": "shots", "line": 3.5}]}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("results/2025-11-10.json"),
            r#"[{"player": "Connor McDavid", "team": "EDM", "opponent": "CGY",
                 "game_id": "2025020201", "game_date": "2025-11-10",
                 "stats": {"points": 2, "shots": 5}}]"#,
        )
        .unwrap();

        let feed = JsonDirFeed::new(&dir);
        let date = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap();
        let slate = feed.fetch_slate(date).await.unwrap();
        assert_eq!(slate.len(), 1);
        assert_eq!(slate[0].props.len(), 2);
        assert_eq!(slate[0].factors.opponent, 1.05);
        assert_eq!(slate[0].factors.venue, 1.0);

        let results = feed.fetch_results(date).await.unwrap();
        assert_eq!(results[0].stats.get("shots"), Some(&5.0));
        assert!(!results[0].is_home);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = scratch_dir("bad");
        std::fs::write(dir.join("results/2025-11-10.json"), "{not json").unwrap();
        let feed = JsonDirFeed::new(&dir);
        let date = NaiveDate::from_ymd_opt(2025, 11, 10).unwrap();
        assert!(feed.fetch_results(date).await.is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
