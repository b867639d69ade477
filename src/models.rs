//! Data models for link click analytics.
//!
//! This module contains the wire types shared with the link backend
//! (click logs, pre-aggregated buckets) and the bucket types produced
//! by the aggregation modules.

use chrono::{
    DateTime, Days, Duration, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, Offset,
    TimeZone, Utc,
};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Unit of time bucketing for the trend panel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Calendar days
    #[default]
    Day,
    /// Calendar months
    Month,
    /// Calendar years
    Year,
    /// Fixed-width windows over the 24 hours of a day
    Hour,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Day => write!(f, "day"),
            Granularity::Month => write!(f, "month"),
            Granularity::Year => write!(f, "year"),
            Granularity::Hour => write!(f, "hour"),
        }
    }
}

impl Granularity {
    /// Returns a human-readable heading for this granularity.
    pub fn heading(&self) -> &'static str {
        match self {
            Granularity::Day => "Daily",
            Granularity::Month => "Monthly",
            Granularity::Year => "Yearly",
            Granularity::Hour => "Hour of day",
        }
    }
}

/// Categorical dimension a click can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Channel,
    Device,
    Referrer,
    Browser,
    Os,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Channel => write!(f, "Channel"),
            Dimension::Device => write!(f, "Device"),
            Dimension::Referrer => write!(f, "Referrer"),
            Dimension::Browser => write!(f, "Browser"),
            Dimension::Os => write!(f, "OS"),
        }
    }
}

impl Dimension {
    /// Label used when a click carries no value for this dimension.
    pub fn default_key(&self) -> &'static str {
        match self {
            Dimension::Channel | Dimension::Referrer => "Direct",
            Dimension::Device => "Others",
            Dimension::Browser | Dimension::Os => "Unknown",
        }
    }
}

/// A single click as recorded by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_hash: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Raw click time as sent by the backend; may be malformed.
    #[serde(default, alias = "timestamp", deserialize_with = "timestamp_text")]
    pub clicked_at: String,
}

impl ClickEvent {
    /// Creates a click at the given time with no classification fields.
    pub fn at(clicked_at: impl Into<String>) -> Self {
        Self {
            clicked_at: clicked_at.into(),
            ..Self::default()
        }
    }

    /// Parses the click time into the given time zone.
    ///
    /// Returns `None` when the timestamp is missing or unparseable.
    pub fn timestamp_in<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<Tz>> {
        parse_timestamp(&self.clicked_at, tz)
    }
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse a click timestamp.
///
/// Offset-qualified RFC 3339 values are converted into `tz`; naive values
/// are interpreted as wall-clock time in `tz`.
pub fn parse_timestamp<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(tz));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return resolve_local(tz, &naive);
        }
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    resolve_local(tz, &date.and_hms_opt(0, 0, 0)?)
}

/// Place a wall-clock time in `tz`.
///
/// Repeated times take the earlier instant. Times skipped by a forward
/// transition are read with the offset in effect before the gap, which
/// moves them past it.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: &NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(at) | LocalResult::Ambiguous(at, _) => Some(at),
        LocalResult::None => {
            let before = naive.checked_sub_days(Days::new(1))?;
            let offset = tz.offset_from_utc_datetime(&before).fix();
            let utc = naive.checked_sub_signed(Duration::seconds(i64::from(
                offset.local_minus_utc(),
            )))?;
            Some(tz.from_utc_datetime(&utc))
        }
    }
}

/// Accepts a string, epoch milliseconds, or null for a click time.
///
/// Any other JSON value becomes an empty string instead of failing the
/// whole log list.
fn timestamp_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Millis(i64),
        FractionalMillis(f64),
        Other(IgnoredAny),
    }

    let millis = match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(text)) => return Ok(text),
        Some(Raw::Millis(millis)) => millis,
        Some(Raw::FractionalMillis(millis)) if millis.is_finite() => millis as i64,
        // Left blank so the click is skipped when bucketing
        Some(Raw::FractionalMillis(_)) | Some(Raw::Other(_)) | None => return Ok(String::new()),
    };

    Ok(DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|at| at.to_rfc3339())
        .unwrap_or_default())
}

/// Accepts either a string or a number for a bucket label.
fn label_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    })
}

/// A labeled time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub label: String,
    pub count: u64,
}

impl TimeBucket {
    pub fn new(label: impl Into<String>, count: u64) -> Self {
        Self {
            label: label.into(),
            count,
        }
    }
}

/// A ranked category bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBucket {
    pub key: String,
    pub count: u64,
}

impl CategoryBucket {
    pub fn new(key: impl Into<String>, count: u64) -> Self {
        Self {
            key: key.into(),
            count,
        }
    }
}

/// A time bucket as summed by the backend.
///
/// Labels arrive in whatever form the backend grouped by, e.g. `"2024-03"`,
/// `202403`, `"07"` or `"Mon"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketCount {
    #[serde(deserialize_with = "label_text")]
    pub bucket: String,
    #[serde(rename = "cnt")]
    pub count: u64,
}

impl BucketCount {
    pub fn new(bucket: impl Into<String>, count: u64) -> Self {
        Self {
            bucket: bucket.into(),
            count,
        }
    }
}

/// A category count as summed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyCount {
    #[serde(alias = "browser", alias = "host", alias = "os", alias = "channel")]
    pub key: String,
    #[serde(rename = "cnt")]
    pub count: u64,
}

impl KeyCount {
    pub fn new(key: impl Into<String>, count: u64) -> Self {
        Self {
            key: key.into(),
            count,
        }
    }
}

/// Short link details used for the report header.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkInfo {
    #[serde(default)]
    pub id: u64,
    pub slug: String,
    pub original_url: String,
    #[serde(default)]
    pub expiration_date: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub created_at: String,
}

/// Visitor uniqueness figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueStats {
    pub total_clicks: u64,
    pub unique_approx: u64,
    pub duplicate_ratio: f64,
    pub unique_windowed: u64,
    pub window_minutes: u64,
}

/// Where a dashboard panel's figures came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataOrigin {
    /// Pre-aggregated by the backend
    Remote,
    /// Recomputed locally from raw click logs
    #[default]
    Computed,
}

impl fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataOrigin::Remote => write!(f, "server aggregate"),
            DataOrigin::Computed => write!(f, "computed from click logs"),
        }
    }
}

/// Data origin of each panel that has a pre-aggregated source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelOrigins {
    pub trend: DataOrigin,
    pub hours: DataOrigin,
    pub weekdays: DataOrigin,
    pub channels: DataOrigin,
    pub referrers: DataOrigin,
    pub browsers: DataOrigin,
    pub unique: DataOrigin,
}

/// Everything a rendering collaborator needs to draw one link's analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    /// Slug the figures belong to.
    pub slug: String,
    /// Link details, when the backend provided them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkInfo>,
    /// Instant the dashboard was assembled, in the dashboard time zone.
    pub generated_at: DateTime<FixedOffset>,
    /// Granularity of the trend series.
    pub granularity: Granularity,
    /// Number of clicks recorded for the link.
    pub total_clicks: u64,
    /// Gap-filled trend series.
    pub trend: Vec<TimeBucket>,
    /// Clicks per hour-of-day window.
    pub hours: Vec<TimeBucket>,
    /// Clicks per weekday, Monday first.
    pub weekdays: Vec<TimeBucket>,
    pub channels: Vec<CategoryBucket>,
    pub devices: Vec<CategoryBucket>,
    pub referrers: Vec<CategoryBucket>,
    pub browsers: Vec<CategoryBucket>,
    pub operating_systems: Vec<CategoryBucket>,
    pub unique: UniqueStats,
    pub origins: PanelOrigins,
    /// Single user-facing notice when any data had to be recomputed or was missing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<String>,
}

impl Dashboard {
    /// Sum of the trend series (clicks inside the trend window).
    pub fn trend_total(&self) -> u64 {
        crate::analysis::series_total(&self.trend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_granularity_display() {
        assert_eq!(Granularity::Day.to_string(), "day");
        assert_eq!(Granularity::Hour.to_string(), "hour");
        assert_eq!(Granularity::Month.heading(), "Monthly");
    }

    #[test]
    fn test_dimension_default_keys() {
        assert_eq!(Dimension::Channel.default_key(), "Direct");
        assert_eq!(Dimension::Referrer.default_key(), "Direct");
        assert_eq!(Dimension::Device.default_key(), "Others");
        assert_eq!(Dimension::Browser.default_key(), "Unknown");
        assert_eq!(Dimension::Os.default_key(), "Unknown");
    }

    #[test]
    fn test_parse_timestamp_rfc3339_converts_zone() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let at = parse_timestamp("2024-03-14T23:30:00Z", &tz).unwrap();
        assert_eq!(at.day(), 15);
        assert_eq!(at.hour(), 8);
    }

    #[test]
    fn test_parse_timestamp_naive_is_local() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let at = parse_timestamp("2024-03-14T23:30:00.123", &tz).unwrap();
        assert_eq!(at.day(), 14);
        assert_eq!(at.hour(), 23);

        let spaced = parse_timestamp("2024-03-14 07:05:00", &Utc).unwrap();
        assert_eq!(spaced.hour(), 7);

        let date_only = parse_timestamp("2024-03-14", &Utc).unwrap();
        assert_eq!(date_only.hour(), 0);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("", &Utc).is_none());
        assert!(parse_timestamp("not a date", &Utc).is_none());
        assert!(parse_timestamp("2024-13-40T00:00:00", &Utc).is_none());
    }

    #[test]
    fn test_click_event_from_backend_json() {
        let json = r#"{
            "id": 7, "linkId": 3, "ipHash": "abc", "referrer": null,
            "channel": "kakao", "deviceType": "Mobile", "os": "iOS",
            "browser": "Safari", "userAgent": "UA", "clickedAt": "2024-03-15T10:00:00"
        }"#;

        let event: ClickEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.link_id, Some(3));
        assert_eq!(event.channel.as_deref(), Some("kakao"));
        assert_eq!(event.device_type.as_deref(), Some("Mobile"));
        assert!(event.referrer.is_none());
        assert_eq!(event.clicked_at, "2024-03-15T10:00:00");
    }

    #[test]
    fn test_click_event_lenient_timestamp() {
        let missing: ClickEvent = serde_json::from_str(r#"{"channel": "x"}"#).unwrap();
        assert!(missing.timestamp_in(&Utc).is_none());

        let null: ClickEvent = serde_json::from_str(r#"{"clickedAt": null}"#).unwrap();
        assert_eq!(null.clicked_at, "");

        let millis: ClickEvent = serde_json::from_str(r#"{"clickedAt": 0}"#).unwrap();
        let at = millis.timestamp_in(&Utc).unwrap();
        assert_eq!(at.year(), 1970);
    }

    #[test]
    fn test_odd_timestamp_values_do_not_fail_the_list() {
        let json = r#"[
            {"clickedAt": "2024-03-15T10:00:00Z"},
            {"clickedAt": [2024, 3, 15, 12, 0, 0]},
            {"clickedAt": 1710496800000.0},
            {"clickedAt": true},
            {"clickedAt": {"epochSecond": 1710496800}}
        ]"#;

        let events: Vec<ClickEvent> = serde_json::from_str(json).unwrap();

        assert_eq!(events.len(), 5);
        assert!(events[0].timestamp_in(&Utc).is_some());
        assert!(events[1].timestamp_in(&Utc).is_none());
        assert_eq!(
            events[2].timestamp_in(&Utc),
            Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).single()
        );
        assert!(events[3].timestamp_in(&Utc).is_none());
        assert!(events[4].timestamp_in(&Utc).is_none());
    }

    /// Central European rules for 2024-03-31 only: +01:00 until 01:00 UTC,
    /// +02:00 after, so local 02:00-02:59 does not exist.
    #[derive(Debug, Clone, Copy)]
    struct SpringForward;

    impl SpringForward {
        fn switch() -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2024, 3, 31)
                .unwrap()
                .and_hms_opt(1, 0, 0)
                .unwrap()
        }

        fn winter() -> FixedOffset {
            FixedOffset::east_opt(3600).unwrap()
        }

        fn summer() -> FixedOffset {
            FixedOffset::east_opt(7200).unwrap()
        }
    }

    impl TimeZone for SpringForward {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            SpringForward
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let gap_start = Self::switch() + Duration::hours(1);
            let gap_end = Self::switch() + Duration::hours(2);
            if *local < gap_start {
                LocalResult::Single(Self::winter())
            } else if *local >= gap_end {
                LocalResult::Single(Self::summer())
            } else {
                LocalResult::None
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc < Self::switch() {
                Self::winter()
            } else {
                Self::summer()
            }
        }
    }

    #[test]
    fn test_parse_timestamp_in_dst_gap() {
        let skipped = parse_timestamp("2024-03-31T02:30:00", &SpringForward).unwrap();
        assert_eq!((skipped.hour(), skipped.minute()), (3, 30));
        assert_eq!(skipped.naive_utc(), SpringForward::switch() + Duration::minutes(30));

        let before = parse_timestamp("2024-03-31 01:30:00", &SpringForward).unwrap();
        assert_eq!(before.hour(), 1);

        let after = parse_timestamp("2024-03-31T03:45", &SpringForward).unwrap();
        assert_eq!(after.hour(), 3);
        assert!(after > skipped);
    }

    #[test]
    fn test_bucket_count_numeric_label() {
        let buckets: Vec<BucketCount> =
            serde_json::from_str(r#"[{"bucket": 202403, "cnt": 4}, {"bucket": "2024-04", "cnt": 1}]"#)
                .unwrap();
        assert_eq!(buckets[0], BucketCount::new("202403", 4));
        assert_eq!(buckets[1], BucketCount::new("2024-04", 1));
    }

    #[test]
    fn test_key_count_aliases() {
        let browsers: Vec<KeyCount> =
            serde_json::from_str(r#"[{"browser": "Chrome", "cnt": 9}]"#).unwrap();
        assert_eq!(browsers[0], KeyCount::new("Chrome", 9));

        let kv: Vec<KeyCount> = serde_json::from_str(r#"[{"key": "naver", "cnt": 2}]"#).unwrap();
        assert_eq!(kv[0].key, "naver");
    }

    #[test]
    fn test_data_origin_display() {
        assert_eq!(DataOrigin::Remote.to_string(), "server aggregate");
        assert_eq!(DataOrigin::default(), DataOrigin::Computed);
    }
}
