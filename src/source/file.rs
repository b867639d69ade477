//! Offline source reading an exported click log from disk.
//!
//! Only raw logs are available here, so every pre-aggregated request
//! reports [`SourceError::Unavailable`] and the dashboard computes all
//! panels locally.

use super::{AnalyticsSource, RemoteGranularity, SourceError, SourceResult};
use crate::models::{BucketCount, ClickEvent, Dimension, KeyCount, LinkInfo, UniqueStats};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

/// Accepted export layouts: a bare array or `{ "logs": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum LogExport {
    Bare(Vec<ClickEvent>),
    Wrapped { logs: Vec<ClickEvent> },
}

/// Analytics source backed by a JSON file of click logs.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse an export document.
    pub fn parse(content: &str) -> SourceResult<Vec<ClickEvent>> {
        let export: LogExport = serde_json::from_str(content)?;
        Ok(match export {
            LogExport::Bare(logs) | LogExport::Wrapped { logs } => logs,
        })
    }
}

#[async_trait]
impl AnalyticsSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn link(&self, _slug: &str) -> SourceResult<LinkInfo> {
        Err(SourceError::Unavailable("link details".to_string()))
    }

    async fn click_logs(&self, slug: &str) -> SourceResult<Vec<ClickEvent>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.display().to_string(),
                source,
            })?;

        let logs = Self::parse(&content)?;
        debug!(
            "Read {} click(s) for {} from {}",
            logs.len(),
            slug,
            self.path.display()
        );
        Ok(logs)
    }

    async fn time_distribution(
        &self,
        _slug: &str,
        granularity: RemoteGranularity,
    ) -> SourceResult<Vec<BucketCount>> {
        Err(SourceError::Unavailable(format!("{} distribution", granularity)))
    }

    async fn categories(&self, _slug: &str, dimension: Dimension) -> SourceResult<Vec<KeyCount>> {
        Err(SourceError::Unavailable(format!("{} breakdown", dimension)))
    }

    async fn unique_stats(&self, _slug: &str) -> SourceResult<UniqueStats> {
        Err(SourceError::Unavailable("unique stats".to_string()))
    }
}
