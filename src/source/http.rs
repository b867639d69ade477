//! REST client for the link backend.

use super::{AnalyticsSource, RemoteGranularity, SourceError, SourceResult};
use crate::models::{BucketCount, ClickEvent, Dimension, KeyCount, LinkInfo, UniqueStats};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Analytics source backed by the link service's REST API.
pub struct HttpSource {
    base_url: Url,
    timeout_seconds: u64,
    http_client: reqwest::Client,
}

impl HttpSource {
    /// Create a client for the API rooted at `base_url` (e.g. `http://localhost:8080/api`).
    pub fn new(base_url: &str, timeout_seconds: u64) -> SourceResult<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| SourceError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        if base_url.cannot_be_a_base() {
            return Err(SourceError::InvalidUrl(base_url.to_string()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            base_url,
            timeout_seconds,
            http_client,
        })
    }

    /// Build `{base}/links/{slug}/{tail...}` with each segment percent-encoded.
    fn endpoint(&self, slug: &str, tail: &[&str]) -> SourceResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("links")
            .push(slug)
            .extend(tail);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> SourceResult<T> {
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    debug!("Request to {} timed out after {}s", url, self.timeout_seconds);
                }
                SourceError::from(e)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn category_path(dimension: Dimension) -> Option<&'static str> {
    match dimension {
        Dimension::Channel => Some("channels"),
        Dimension::Referrer => Some("referrers"),
        Dimension::Browser => Some("browsers"),
        Dimension::Device | Dimension::Os => None,
    }
}

#[async_trait]
impl AnalyticsSource for HttpSource {
    fn describe(&self) -> String {
        self.base_url.to_string()
    }

    async fn link(&self, slug: &str) -> SourceResult<LinkInfo> {
        self.get_json(self.endpoint(slug, &[])?).await
    }

    async fn click_logs(&self, slug: &str) -> SourceResult<Vec<ClickEvent>> {
        self.get_json(self.endpoint(slug, &["logs"])?).await
    }

    async fn time_distribution(
        &self,
        slug: &str,
        granularity: RemoteGranularity,
    ) -> SourceResult<Vec<BucketCount>> {
        let mut url = self.endpoint(slug, &["time-distribution"])?;
        url.query_pairs_mut()
            .append_pair("granularity", granularity.as_str());
        self.get_json(url).await
    }

    async fn categories(&self, slug: &str, dimension: Dimension) -> SourceResult<Vec<KeyCount>> {
        let path = category_path(dimension)
            .ok_or_else(|| SourceError::Unavailable(format!("{} breakdown", dimension)))?;
        self.get_json(self.endpoint(slug, &[path])?).await
    }

    async fn unique_stats(&self, slug: &str) -> SourceResult<UniqueStats> {
        self.get_json(self.endpoint(slug, &["unique-stats"])?).await
    }
}
