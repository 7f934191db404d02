use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::db::models::{PlayerResult, SlateEntry};
use super::provider::{ResultsProvider, SlateProvider};

/// Feed served over HTTP in the same JSON shape as [`super::JsonDirFeed`]:
/// `GET <base>/slate/<date>` and `GET <base>/results/<date>`.
pub struct HttpFeed {
    http: Client,
    base_url: String,
}

impl HttpFeed {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(HttpFeed {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, kind: &str, date: NaiveDate) -> String {
        format!("{}/{}/{}", self.base_url, kind, date.format("%Y-%m-%d"))
    }

    async fn get_list<T: DeserializeOwned>(&self, kind: &str, date: NaiveDate) -> Result<Vec<T>> {
        let url = self.url_for(kind, date);
        debug!("Fetching {} from {}", kind, url);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("{} request failed", kind))?;

        if !resp.status().is_success() {
            anyhow::bail!("{} feed error: {}", kind, resp.status());
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse {} response", kind))
    }
}

#[async_trait]
impl SlateProvider for HttpFeed {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_slate(&self, date: NaiveDate) -> Result<Vec<SlateEntry>> {
        self.get_list("slate", date).await
    }
}

#[async_trait]
impl ResultsProvider for HttpFeed {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_results(&self, date: NaiveDate) -> Result<Vec<PlayerResult>> {
        self.get_list("results", date).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_dated_urls() {
        let feed = HttpFeed::new("http://localhost:8080/feeds/").unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(
            feed.url_for("results", date),
            "http://localhost:8080/feeds/results/2025-03-07"
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_an_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let feed = HttpFeed::new("http://127.0.0.1:9").unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert!(feed.fetch_results(date).await.is_err());
    }
}
