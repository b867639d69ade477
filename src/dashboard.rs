//! Dashboard assembly.
//!
//! [`DashboardService`] retrieves everything a link's dashboard needs from
//! an [`AnalyticsSource`] and reduces it into one [`Dashboard`]. Panels with
//! a pre-aggregated counterpart prefer the backend's figures and fall back
//! to computing from the raw click logs when that request fails. Only the
//! most recent `load` call produces a result.

use crate::analysis::{
    aggregate, bucket_events, collapse_to_years, expected_labels, fill_window, hour_windows,
    hourly_counts_from_buckets, hourly_counts_from_events, merge_month_buckets, rank_counts,
    unique_stats, weekday_counts_from_buckets, weekday_counts_from_events, Window,
};
use crate::config::Config;
use crate::models::{
    BucketCount, CategoryBucket, ClickEvent, Dashboard, DataOrigin, Dimension, Granularity,
    KeyCount, LinkInfo, PanelOrigins, TimeBucket, UniqueStats,
};
use crate::source::{AnalyticsSource, RemoteGranularity, SourceError, SourceResult};
use chrono::{DateTime, TimeZone};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Advisory shown when the raw click logs could not be retrieved.
pub const LOGS_UNAVAILABLE: &str =
    "Click logs could not be retrieved; panels computed from logs show no data.";

/// What the caller asked to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub granularity: Granularity,
    pub window: Window,
    /// Cap for channel, referrer, browser and OS rankings.
    pub top: usize,
    pub unique_window_minutes: u64,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            granularity: Granularity::default(),
            window: Window::default(),
            top: crate::analysis::categories::DEFAULT_TOP,
            unique_window_minutes: crate::analysis::uniques::DEFAULT_WINDOW_MINUTES,
        }
    }
}

impl From<&Config> for Selection {
    fn from(config: &Config) -> Self {
        Self {
            granularity: config.window.granularity,
            window: Window::from(&config.window),
            top: config.categories.top_n,
            unique_window_minutes: config.categories.unique_window_minutes,
        }
    }
}

/// Raw retrieval results for one dashboard.
#[derive(Debug)]
pub struct Inputs {
    pub logs: SourceResult<Vec<ClickEvent>>,
    pub link: SourceResult<LinkInfo>,
    /// Only requested for month and year trends.
    pub months: Option<SourceResult<Vec<BucketCount>>>,
    pub hours: SourceResult<Vec<BucketCount>>,
    pub weekdays: SourceResult<Vec<BucketCount>>,
    pub channels: SourceResult<Vec<KeyCount>>,
    pub referrers: SourceResult<Vec<KeyCount>>,
    pub browsers: SourceResult<Vec<KeyCount>>,
    pub unique: SourceResult<UniqueStats>,
}

impl Inputs {
    /// Inputs where only raw logs are available.
    pub fn from_logs(logs: Vec<ClickEvent>) -> Self {
        let missing = |what: &str| SourceError::Unavailable(what.to_string());
        Self {
            logs: Ok(logs),
            link: Err(missing("link details")),
            months: Some(Err(missing("month distribution"))),
            hours: Err(missing("hour distribution")),
            weekdays: Err(missing("dow distribution")),
            channels: Err(missing("Channel breakdown")),
            referrers: Err(missing("Referrer breakdown")),
            browsers: Err(missing("Browser breakdown")),
            unique: Err(missing("unique stats")),
        }
    }
}

/// Bookkeeping for panels that had to be recomputed.
#[derive(Default)]
struct Fallbacks {
    recomputed: Vec<&'static str>,
}

impl Fallbacks {
    /// Unwrap a remote result, recording a genuine failure against `panel`.
    ///
    /// `Unavailable` is expected from offline sources and is not reported.
    fn take<T>(&mut self, panel: &'static str, result: SourceResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) if e.is_unavailable() => {
                debug!("{}: {}", panel, e);
                None
            }
            Err(e) => {
                warn!("Falling back to click logs for {}: {}", panel, e);
                self.recomputed.push(panel);
                None
            }
        }
    }

    fn advisory(&self) -> Option<String> {
        if self.recomputed.is_empty() {
            return None;
        }
        Some(format!(
            "Pre-aggregated statistics were unavailable for {}; recomputed from raw click logs.",
            self.recomputed.join(", ")
        ))
    }
}

fn origin<T>(remote: &Option<T>) -> DataOrigin {
    if remote.is_some() {
        DataOrigin::Remote
    } else {
        DataOrigin::Computed
    }
}

/// Reduce retrieval results into a dashboard anchored at `now`.
///
/// Bucket shapes are identical whichever side produced the counts.
pub fn assemble<Tz: TimeZone>(
    slug: &str,
    inputs: Inputs,
    selection: &Selection,
    now: &DateTime<Tz>,
) -> Dashboard {
    let tz = now.timezone();
    let top = Some(selection.top);
    let step = selection.window.hour_step;
    let mut fallbacks = Fallbacks::default();

    let (logs, logs_ok) = match inputs.logs {
        Ok(logs) => (logs, true),
        Err(e) => {
            warn!("Failed to retrieve click logs for {}: {}", slug, e);
            (Vec::new(), false)
        }
    };

    let link = match inputs.link {
        Ok(link) => Some(link),
        Err(e) => {
            debug!("No link details for {}: {}", slug, e);
            None
        }
    };

    let remote_hours = fallbacks.take("hour of day", inputs.hours);
    let hours_origin = origin(&remote_hours);
    let hours = match remote_hours {
        Some(buckets) => hour_windows(&hourly_counts_from_buckets(&buckets), step),
        None => hour_windows(&hourly_counts_from_events(&logs, &tz), step),
    };

    let remote_weekdays = fallbacks.take("day of week", inputs.weekdays);
    let weekdays_origin = origin(&remote_weekdays);
    let weekdays = match remote_weekdays {
        Some(buckets) => weekday_counts_from_buckets(&buckets),
        None => weekday_counts_from_events(&logs, &tz),
    };

    let (trend, trend_origin) = match selection.granularity {
        Granularity::Day => (
            bucket_events(&logs, Granularity::Day, &selection.window, now),
            DataOrigin::Computed,
        ),
        Granularity::Hour => (hours.clone(), hours_origin),
        granularity @ (Granularity::Month | Granularity::Year) => {
            let remote = inputs
                .months
                .and_then(|months| fallbacks.take("monthly trend", months));
            match remote {
                Some(buckets) => (
                    remote_trend(&buckets, granularity, &selection.window, now),
                    DataOrigin::Remote,
                ),
                None => (
                    bucket_events(&logs, granularity, &selection.window, now),
                    DataOrigin::Computed,
                ),
            }
        }
    };

    debug_assert_eq!(trend.len(), selection.window.len(selection.granularity));

    let (channels, channels_origin) = ranking(
        fallbacks.take("channels", inputs.channels),
        &logs,
        Dimension::Channel,
        top,
    );
    let (referrers, referrers_origin) = ranking(
        fallbacks.take("referrers", inputs.referrers),
        &logs,
        Dimension::Referrer,
        top,
    );
    let (browsers, browsers_origin) = ranking(
        fallbacks.take("browsers", inputs.browsers),
        &logs,
        Dimension::Browser,
        top,
    );

    let remote_unique = fallbacks.take("unique visitors", inputs.unique);
    let unique_origin = origin(&remote_unique);
    let unique = remote_unique
        .unwrap_or_else(|| unique_stats(&logs, selection.unique_window_minutes));

    let total_clicks = if logs_ok {
        logs.len() as u64
    } else {
        unique.total_clicks
    };

    let advisory = if logs_ok {
        fallbacks.advisory()
    } else {
        Some(LOGS_UNAVAILABLE.to_string())
    };

    Dashboard {
        slug: slug.to_string(),
        link,
        generated_at: now.fixed_offset(),
        granularity: selection.granularity,
        total_clicks,
        trend,
        hours,
        weekdays,
        channels,
        devices: aggregate(&logs, Dimension::Device, None),
        referrers,
        browsers,
        operating_systems: aggregate(&logs, Dimension::Os, top),
        unique,
        origins: PanelOrigins {
            trend: trend_origin,
            hours: hours_origin,
            weekdays: weekdays_origin,
            channels: channels_origin,
            referrers: referrers_origin,
            browsers: browsers_origin,
            unique: unique_origin,
        },
        advisory,
    }
}

fn remote_trend<Tz: TimeZone>(
    buckets: &[BucketCount],
    granularity: Granularity,
    window: &Window,
    now: &DateTime<Tz>,
) -> Vec<TimeBucket> {
    let months = merge_month_buckets(buckets);
    let counts = if granularity == Granularity::Year {
        collapse_to_years(&months)
    } else {
        months
    };
    fill_window(&counts, &expected_labels(granularity, window, now))
}

fn ranking(
    remote: Option<Vec<KeyCount>>,
    logs: &[ClickEvent],
    dimension: Dimension,
    top: Option<usize>,
) -> (Vec<CategoryBucket>, DataOrigin) {
    match remote {
        Some(pairs) => (rank_counts(&pairs, dimension, top), DataOrigin::Remote),
        None => (aggregate(logs, dimension, top), DataOrigin::Computed),
    }
}

/// Loads dashboards from a source, letting the newest request win.
pub struct DashboardService {
    source: Arc<dyn AnalyticsSource>,
    current: Mutex<Option<CancellationToken>>,
}

impl DashboardService {
    pub fn new(source: Arc<dyn AnalyticsSource>) -> Self {
        Self {
            source,
            current: Mutex::new(None),
        }
    }

    /// Register a new request and cancel the one in flight, if any.
    fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = current.replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Retrieve and assemble the dashboard for `slug`.
    ///
    /// Returns `None` when a later call to `load` started before this one
    /// finished; the superseded result is discarded.
    pub async fn load<Tz: TimeZone>(
        &self,
        slug: &str,
        selection: &Selection,
        now: DateTime<Tz>,
    ) -> Option<Dashboard> {
        let token = self.begin();
        info!(
            "Loading {} analytics for {} from {}",
            selection.granularity,
            slug,
            self.source.describe()
        );

        let inputs = tokio::select! {
            _ = token.cancelled() => {
                debug!("Request for {} superseded", slug);
                return None;
            }
            inputs = self.fetch_inputs(slug, selection.granularity) => inputs,
        };

        if token.is_cancelled() {
            debug!("Discarding superseded result for {}", slug);
            return None;
        }

        Some(assemble(slug, inputs, selection, &now))
    }

    async fn fetch_inputs(&self, slug: &str, granularity: Granularity) -> Inputs {
        let source = self.source.as_ref();

        let logs = source.click_logs(slug).await;
        if let Ok(ref logs) = logs {
            debug!("Retrieved {} click log(s)", logs.len());
        }

        let wants_months = matches!(granularity, Granularity::Month | Granularity::Year);
        let months = async {
            if wants_months {
                Some(source.time_distribution(slug, RemoteGranularity::Month).await)
            } else {
                None
            }
        };

        let (link, months, hours, weekdays, channels, referrers, browsers, unique) = tokio::join!(
            source.link(slug),
            months,
            source.time_distribution(slug, RemoteGranularity::Hour),
            source.time_distribution(slug, RemoteGranularity::Dow),
            source.categories(slug, Dimension::Channel),
            source.categories(slug, Dimension::Referrer),
            source.categories(slug, Dimension::Browser),
            source.unique_stats(slug),
        );

        Inputs {
            logs,
            link,
            months,
            hours,
            weekdays,
            channels,
            referrers,
            browsers,
            unique,
        }
    }
}
