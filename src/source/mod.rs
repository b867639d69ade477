//! Retrieval of click data.
//!
//! An [`AnalyticsSource`] hands out raw click logs and, where the backing
//! store supports it, distributions that were already summed server-side.
//! Every call may fail; callers decide how to degrade.

pub mod file;
pub mod http;

pub use file::FileSource;
pub use http::HttpSource;

use crate::models::{BucketCount, ClickEvent, Dimension, KeyCount, LinkInfo, UniqueStats};
use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use reqwest::Url;
use std::fmt;
use thiserror::Error;

/// Errors raised by analytics sources.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid slug: {0}")]
    InvalidSlug(String),

    /// The source has no such endpoint. Expected in offline mode.
    #[error("{0} is not available from this source")]
    Unavailable(String),
}

impl SourceError {
    /// Whether this error means "not offered" rather than "went wrong".
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SourceError::Unavailable(_))
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Granularities the backend can pre-aggregate by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteGranularity {
    Hour,
    Dow,
    Month,
}

impl RemoteGranularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteGranularity::Hour => "hour",
            RemoteGranularity::Dow => "dow",
            RemoteGranularity::Month => "month",
        }
    }
}

impl fmt::Display for RemoteGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A provider of click data for a link.
#[async_trait]
pub trait AnalyticsSource: Send + Sync {
    /// Short description used in log lines.
    fn describe(&self) -> String;

    /// Link details for the report header.
    async fn link(&self, slug: &str) -> SourceResult<LinkInfo>;

    /// Every recorded click of the link.
    async fn click_logs(&self, slug: &str) -> SourceResult<Vec<ClickEvent>>;

    /// Click counts summed by the backend at the given granularity.
    async fn time_distribution(
        &self,
        slug: &str,
        granularity: RemoteGranularity,
    ) -> SourceResult<Vec<BucketCount>>;

    /// Click counts summed by the backend for a categorical dimension.
    async fn categories(&self, slug: &str, dimension: Dimension) -> SourceResult<Vec<KeyCount>>;

    /// Uniqueness figures computed by the backend.
    async fn unique_stats(&self, slug: &str) -> SourceResult<UniqueStats>;
}

/// Path segments that precede a slug in short or dashboard URLs.
const SLUG_PREFIXES: &[&str] = &["r", "analytics", "links", "stats"];

/// Resolve the link slug from user input.
///
/// Accepts a bare slug, a short URL (`https://host/r/<slug>`), a dashboard
/// URL (`/analytics/<slug>`, `/links/<slug>`, `/stats/<slug>`) or any URL
/// carrying a `slug` query parameter, including inside the fragment.
pub fn resolve_slug(input: &str) -> SourceResult<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SourceError::InvalidSlug("no link given".to_string()));
    }

    if !input.contains("://") && !input.starts_with('/') {
        if input.contains(['/', '?', '#']) || input.chars().any(char::is_whitespace) {
            return Err(SourceError::InvalidSlug(input.to_string()));
        }
        return Ok(input.to_string());
    }

    let url = if input.starts_with('/') {
        Url::parse("http://localhost")
            .and_then(|base| base.join(input))
            .map_err(|e| SourceError::InvalidUrl(format!("{}: {}", input, e)))?
    } else {
        Url::parse(input).map_err(|e| SourceError::InvalidUrl(format!("{}: {}", input, e)))?
    };

    if let Some(slug) = slug_param(&url) {
        return Ok(slug);
    }

    if let Some(segments) = url.path_segments() {
        let segments: Vec<&str> = segments.filter(|s| !s.is_empty()).collect();
        for pair in segments.windows(2) {
            if SLUG_PREFIXES.contains(&pair[0]) {
                return Ok(percent_decode_str(pair[1]).decode_utf8_lossy().into_owned());
            }
        }
    }

    // Hash-routed dashboards keep the query inside the fragment
    if let Some(fragment) = url.fragment() {
        let query = fragment.split_once('?').map(|(_, q)| q).unwrap_or(fragment);
        if let Some(slug) = Url::parse(&format!("http://localhost/?{}", query))
            .ok()
            .and_then(|inner| slug_param(&inner))
        {
            return Ok(slug);
        }
    }

    Err(SourceError::InvalidSlug(input.to_string()))
}

fn slug_param(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, value)| key == "slug" && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}
