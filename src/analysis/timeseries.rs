//! Time-series bucketing of click logs.
//!
//! Every series produced here is gap-filled: the full list of expected
//! labels for the window is computed first, anchored at `now`, and counts
//! are looked up by label afterwards. Output order is therefore always the
//! chronological label order, never the order events arrived in.

use crate::models::{BucketCount, ClickEvent, Granularity, TimeBucket};
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, TimeZone, Timelike, Weekday};
use std::collections::HashMap;
use tracing::debug;

/// Counts keyed by bucket label.
pub type LabelCounts = HashMap<String, u64>;

/// Raw clicks per hour of day, index 0 is 00:00-00:59.
pub type HourlyCounts = [u64; 24];

pub const HOURS_PER_DAY: u32 = 24;

/// Weekday labels in ISO order.
pub const WEEKDAY_LABELS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// How far back each granularity reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Calendar days ending today.
    pub days: u32,
    /// Calendar months ending this month.
    pub months: u32,
    /// Calendar years ending this year.
    pub years: u32,
    /// Width in hours of each hour-of-day window.
    pub hour_step: u32,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            days: 7,
            months: 12,
            years: 5,
            hour_step: 3,
        }
    }
}

impl From<&crate::config::WindowConfig> for Window {
    fn from(config: &crate::config::WindowConfig) -> Self {
        Self {
            days: config.days,
            months: config.months,
            years: config.years,
            hour_step: config.hour_step,
        }
    }
}

impl Window {
    /// Number of buckets a series of this granularity contains.
    pub fn len(&self, granularity: Granularity) -> usize {
        match granularity {
            Granularity::Day => self.days as usize,
            Granularity::Month => self.months as usize,
            Granularity::Year => self.years as usize,
            Granularity::Hour => {
                let step = clamp_step(self.hour_step);
                HOURS_PER_DAY.div_ceil(step) as usize
            }
        }
    }
}

fn clamp_step(step: u32) -> u32 {
    step.clamp(1, HOURS_PER_DAY)
}

fn day_label(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn month_label(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

fn year_label(year: i32) -> String {
    format!("{:04}", year)
}

fn hour_label(hour: u32) -> String {
    format!("{:02}:00", hour)
}

/// Label of the hour window containing `hour`.
pub fn hour_window_label(hour: u32, step: u32) -> String {
    let step = clamp_step(step);
    hour_label((hour / step) * step)
}

/// Compute the full ordered label list for a window anchored at `now`.
pub fn expected_labels<Tz: TimeZone>(
    granularity: Granularity,
    window: &Window,
    now: &DateTime<Tz>,
) -> Vec<String> {
    let today = now.date_naive();

    match granularity {
        Granularity::Day => (0..window.days)
            .rev()
            .filter_map(|back| today.checked_sub_days(Days::new(u64::from(back))))
            .map(day_label)
            .collect(),
        Granularity::Month => {
            let Some(first) = today.with_day(1) else {
                return Vec::new();
            };
            (0..window.months)
                .rev()
                .filter_map(|back| first.checked_sub_months(Months::new(back)))
                .map(month_label)
                .collect()
        }
        Granularity::Year => (0..window.years)
            .rev()
            .map(|back| year_label(today.year() - back as i32))
            .collect(),
        Granularity::Hour => (0..HOURS_PER_DAY)
            .step_by(clamp_step(window.hour_step) as usize)
            .map(hour_label)
            .collect(),
    }
}

/// Compute the bucket label of a single instant.
pub fn label_for<Tz: TimeZone>(granularity: Granularity, hour_step: u32, at: &DateTime<Tz>) -> String {
    match granularity {
        Granularity::Day => day_label(at.date_naive()),
        Granularity::Month => month_label(at.date_naive()),
        Granularity::Year => year_label(at.year()),
        Granularity::Hour => hour_window_label(at.hour(), hour_step),
    }
}

/// Count events per label, skipping unparseable timestamps.
fn count_by_label<Tz, F>(events: &[ClickEvent], tz: &Tz, label: F) -> LabelCounts
where
    Tz: TimeZone,
    F: Fn(&DateTime<Tz>) -> String,
{
    let mut counts = LabelCounts::new();
    let mut skipped = 0usize;

    for event in events {
        match event.timestamp_in(tz) {
            Some(at) => *counts.entry(label(&at)).or_insert(0) += 1,
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!("Skipped {} click(s) with unparseable timestamps", skipped);
    }

    counts
}

/// Map the expected labels through a count lookup, zero-filling gaps.
pub fn fill_window(counts: &LabelCounts, labels: &[String]) -> Vec<TimeBucket> {
    labels
        .iter()
        .map(|label| TimeBucket::new(label.clone(), counts.get(label).copied().unwrap_or(0)))
        .collect()
}

/// Bucket raw click events into a gap-filled series.
///
/// Year views are aggregated by month first and then collapsed, so the
/// same path serves both raw logs and pre-aggregated month buckets.
pub fn bucket_events<Tz: TimeZone>(
    events: &[ClickEvent],
    granularity: Granularity,
    window: &Window,
    now: &DateTime<Tz>,
) -> Vec<TimeBucket> {
    let tz = now.timezone();

    match granularity {
        Granularity::Hour => hour_windows(&hourly_counts_from_events(events, &tz), window.hour_step),
        Granularity::Year => {
            let months = count_by_label(events, &tz, |at| month_label(at.date_naive()));
            fill_window(
                &collapse_to_years(&months),
                &expected_labels(granularity, window, now),
            )
        }
        Granularity::Day | Granularity::Month => {
            let counts = count_by_label(events, &tz, |at| label_for(granularity, window.hour_step, at));
            fill_window(&counts, &expected_labels(granularity, window, now))
        }
    }
}

/// Normalize a month bucket label to `YYYY-MM`.
///
/// Accepts any value starting with `YYYY-MM` (dates, timestamps) and the
/// compact `YYYYMM` code. Anything else is returned unchanged.
pub fn normalize_month_label(raw: &str) -> String {
    let raw = raw.trim();
    let bytes = raw.as_bytes();

    if bytes.len() >= 7
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(u8::is_ascii_digit)
    {
        return raw[..7].to_string();
    }

    if bytes.len() == 6 && bytes.iter().all(u8::is_ascii_digit) {
        return format!("{}-{}", &raw[..4], &raw[4..]);
    }

    raw.to_string()
}

/// Normalize month buckets and merge differently formatted duplicates.
pub fn merge_month_buckets(buckets: &[BucketCount]) -> LabelCounts {
    let mut months = LabelCounts::new();

    for bucket in buckets {
        *months.entry(normalize_month_label(&bucket.bucket)).or_insert(0) += bucket.count;
    }

    months
}

/// Sum month counts sharing the same leading four-digit year.
pub fn collapse_to_years(months: &LabelCounts) -> LabelCounts {
    let mut years = LabelCounts::new();

    for (month, count) in months {
        match month.get(..4) {
            Some(year) if year.bytes().all(|b| b.is_ascii_digit()) => {
                *years.entry(year.to_string()).or_insert(0) += count;
            }
            _ => debug!("Ignoring month bucket with no year: {:?}", month),
        }
    }

    years
}

/// Hourly histogram of raw clicks in the given time zone.
pub fn hourly_counts_from_events<Tz: TimeZone>(events: &[ClickEvent], tz: &Tz) -> HourlyCounts {
    let mut hourly = [0u64; 24];

    for at in events.iter().filter_map(|e| e.timestamp_in(tz)) {
        hourly[at.hour() as usize] += 1;
    }

    hourly
}

/// Parse an hour bucket label such as `"3"`, `"03"` or `"03:00"`.
pub fn parse_hour_label(label: &str) -> Option<usize> {
    label
        .trim()
        .split(':')
        .next()?
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|hour| *hour < HOURS_PER_DAY as usize)
}

/// Hourly histogram from pre-aggregated hour buckets.
pub fn hourly_counts_from_buckets(buckets: &[BucketCount]) -> HourlyCounts {
    let mut hourly = [0u64; 24];

    for bucket in buckets {
        match parse_hour_label(&bucket.bucket) {
            Some(hour) => hourly[hour] += bucket.count,
            None => debug!("Ignoring hour bucket {:?}", bucket.bucket),
        }
    }

    hourly
}

/// Group an hourly histogram into fixed-width windows.
///
/// Each hour lands in exactly one window (`hour / step`).
pub fn hour_windows(hourly: &HourlyCounts, step: u32) -> Vec<TimeBucket> {
    let step = clamp_step(step) as usize;

    let mut windows: Vec<TimeBucket> = (0..HOURS_PER_DAY)
        .step_by(step)
        .map(|hour| TimeBucket::new(hour_label(hour), 0))
        .collect();

    for (hour, count) in hourly.iter().enumerate() {
        windows[hour / step].count += count;
    }

    windows
}

fn weekday_buckets(counts: [u64; 7]) -> Vec<TimeBucket> {
    WEEKDAY_LABELS
        .iter()
        .zip(counts)
        .map(|(label, count)| TimeBucket::new(*label, count))
        .collect()
}

/// Clicks per weekday in the given time zone, Monday first.
pub fn weekday_counts_from_events<Tz: TimeZone>(events: &[ClickEvent], tz: &Tz) -> Vec<TimeBucket> {
    let mut counts = [0u64; 7];

    for at in events.iter().filter_map(|e| e.timestamp_in(tz)) {
        counts[at.weekday().num_days_from_monday() as usize] += 1;
    }

    weekday_buckets(counts)
}

/// Parse a day-of-week bucket label into an ISO index (Monday = 0).
///
/// Numeric labels follow the `0 = Sunday` convention, with `7` also
/// accepted as Sunday. English names and abbreviations are accepted too.
pub fn parse_weekday_label(label: &str) -> Option<usize> {
    let label = label.trim();

    if let Ok(n) = label.parse::<u32>() {
        return match n {
            0 | 7 => Some(6),
            1..=6 => Some(n as usize - 1),
            _ => None,
        };
    }

    label
        .parse::<Weekday>()
        .ok()
        .map(|day| day.num_days_from_monday() as usize)
}

/// Weekday series from pre-aggregated day-of-week buckets.
pub fn weekday_counts_from_buckets(buckets: &[BucketCount]) -> Vec<TimeBucket> {
    let mut counts = [0u64; 7];

    for bucket in buckets {
        match parse_weekday_label(&bucket.bucket) {
            Some(day) => counts[day] += bucket.count,
            None => debug!("Ignoring weekday bucket {:?}", bucket.bucket),
        }
    }

    weekday_buckets(counts)
}

/// Sum of all bucket counts.
pub fn series_total(buckets: &[TimeBucket]) -> u64 {
    buckets.iter().map(|b| b.count).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn clicks(times: &[&str]) -> Vec<ClickEvent> {
        times.iter().map(|t| ClickEvent::at(*t)).collect()
    }

    fn labels(series: &[TimeBucket]) -> Vec<&str> {
        series.iter().map(|b| b.label.as_str()).collect()
    }

    #[test]
    fn test_day_labels_end_today() {
        let labels = expected_labels(Granularity::Day, &Window::default(), &now());
        assert_eq!(labels.len(), 7);
        assert_eq!(labels.first().unwrap(), "2024-03-09");
        assert_eq!(labels.last().unwrap(), "2024-03-15");
    }

    #[test]
    fn test_month_labels_cross_year() {
        let labels = expected_labels(Granularity::Month, &Window::default(), &now());
        assert_eq!(labels.len(), 12);
        assert_eq!(labels.first().unwrap(), "2023-04");
        assert_eq!(labels.last().unwrap(), "2024-03");
    }

    #[test]
    fn test_month_labels_from_month_end() {
        let end_of_month = Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap();
        let labels = expected_labels(Granularity::Month, &Window::default(), &end_of_month);
        assert!(labels.contains(&"2024-02".to_string()));
        assert_eq!(labels.len(), 12);
    }

    #[test]
    fn test_year_and_hour_labels() {
        let years = expected_labels(Granularity::Year, &Window::default(), &now());
        assert_eq!(years, vec!["2020", "2021", "2022", "2023", "2024"]);

        let hours = expected_labels(Granularity::Hour, &Window::default(), &now());
        assert_eq!(
            hours,
            vec!["00:00", "03:00", "06:00", "09:00", "12:00", "15:00", "18:00", "21:00"]
        );
    }

    #[test]
    fn test_empty_input_is_zero_filled() {
        let window = Window::default();
        for granularity in [
            Granularity::Day,
            Granularity::Month,
            Granularity::Year,
            Granularity::Hour,
        ] {
            let series = bucket_events(&[], granularity, &window, &now());
            assert_eq!(series.len(), window.len(granularity));
            assert!(series.iter().all(|b| b.count == 0));
        }
    }

    #[test]
    fn test_window_length_follows_hour_step() {
        for step in [1, 2, 4, 6, 8, 12, 24] {
            let window = Window {
                hour_step: step,
                ..Window::default()
            };
            let series = bucket_events(&[], Granularity::Hour, &window, &now());
            assert_eq!(series.len(), (24 / step) as usize);
        }
    }

    #[test]
    fn test_day_buckets_exclude_out_of_window() {
        let events = clicks(&[
            "2024-03-15T08:00:00Z",
            "2024-03-15T09:00:00Z",
            "2024-03-09T00:00:00Z",
            "2024-03-08T23:59:59Z",
            "2023-01-01T00:00:00Z",
        ]);

        let series = bucket_events(&events, Granularity::Day, &Window::default(), &now());

        assert_eq!(series.len(), 7);
        assert_eq!(series[0], TimeBucket::new("2024-03-09", 1));
        assert_eq!(series[6], TimeBucket::new("2024-03-15", 2));
        assert_eq!(series_total(&series), 3);
    }

    #[test]
    fn test_unparseable_timestamps_skipped() {
        let events = clicks(&["garbage", "", "2024-03-14T10:00:00Z"]);
        let series = bucket_events(&events, Granularity::Day, &Window::default(), &now());
        assert_eq!(series_total(&series), 1);
        assert_eq!(series[5], TimeBucket::new("2024-03-14", 1));
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut events = clicks(&[
            "2024-03-10T01:00:00Z",
            "2024-03-15T01:00:00Z",
            "2024-03-12T01:00:00Z",
            "2024-03-12T02:00:00Z",
        ]);

        let forward = bucket_events(&events, Granularity::Day, &Window::default(), &now());
        let again = bucket_events(&events, Granularity::Day, &Window::default(), &now());
        events.reverse();
        let reversed = bucket_events(&events, Granularity::Day, &Window::default(), &now());

        assert_eq!(forward, again);
        assert_eq!(forward, reversed);
        assert_eq!(
            labels(&forward),
            expected_labels(Granularity::Day, &Window::default(), &now())
        );
    }

    #[test]
    fn test_day_bucket_uses_dashboard_time_zone() {
        let seoul = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = seoul.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let events = clicks(&["2024-03-14T23:30:00Z"]);

        let series = bucket_events(&events, Granularity::Day, &Window::default(), &now);

        assert_eq!(series.last().unwrap(), &TimeBucket::new("2024-03-15", 1));
    }

    #[test]
    fn test_month_and_year_from_events() {
        let events = clicks(&[
            "2024-03-01T00:00:00Z",
            "2024-01-31T00:00:00Z",
            "2023-12-31T00:00:00Z",
            "2019-06-01T00:00:00Z",
        ]);

        let months = bucket_events(&events, Granularity::Month, &Window::default(), &now());
        assert_eq!(series_total(&months), 3);
        assert_eq!(months.last().unwrap().count, 1);

        let years = bucket_events(&events, Granularity::Year, &Window::default(), &now());
        assert_eq!(labels(&years), vec!["2020", "2021", "2022", "2023", "2024"]);
        assert_eq!(years[3].count, 1);
        assert_eq!(years[4].count, 2);
    }

    #[test]
    fn test_normalize_month_label() {
        assert_eq!(normalize_month_label("2024-03-15"), "2024-03");
        assert_eq!(normalize_month_label("2024-03"), "2024-03");
        assert_eq!(normalize_month_label("202403"), "2024-03");
        assert_eq!(normalize_month_label(" 2024-03-15T10:00:00Z "), "2024-03");
        assert_eq!(normalize_month_label("March"), "March");
    }

    #[test]
    fn test_month_buckets_merge_across_formats() {
        let buckets = vec![
            BucketCount::new("2024-03-15", 1),
            BucketCount::new("2024-03", 2),
            BucketCount::new("202403", 3),
            BucketCount::new("2024-02", 5),
        ];

        let months = merge_month_buckets(&buckets);

        assert_eq!(months.len(), 2);
        assert_eq!(months.get("2024-03"), Some(&6));
        assert_eq!(months.get("2024-02"), Some(&5));
    }

    #[test]
    fn test_collapse_to_years() {
        let months: LabelCounts = [("2024-01", 5), ("2024-02", 3), ("2023-12", 2)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        let years = collapse_to_years(&months);

        assert_eq!(years.len(), 2);
        assert_eq!(years.get("2024"), Some(&8));
        assert_eq!(years.get("2023"), Some(&2));
    }

    #[test]
    fn test_hour_windows_floor_division() {
        let mut hourly = [0u64; 24];
        for (hour, slot) in hourly.iter_mut().enumerate() {
            *slot = hour as u64 + 1;
        }

        let windows = hour_windows(&hourly, 3);

        assert_eq!(windows.len(), 8);
        assert_eq!(windows[0], TimeBucket::new("00:00", 1 + 2 + 3));
        assert_eq!(windows[7], TimeBucket::new("21:00", 22 + 23 + 24));
        assert_eq!(series_total(&windows), (1..=24).sum::<u64>());
    }

    #[test]
    fn test_hour_buckets_from_logs_use_local_hour() {
        let seoul = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = seoul.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let events = clicks(&[
            "2024-03-15T01:30:00Z", // 10:30 local
            "2024-03-14T23:10:00Z", // 08:10 local
            "2024-03-15T16:00:00Z", // 01:00 local, next day
            "2024-03-15T23:10:00",  // naive, already local
            "not a time",
        ]);

        let series = bucket_events(&events, Granularity::Hour, &Window::default(), &now);

        assert_eq!(series.len(), 8);
        assert_eq!(series[0], TimeBucket::new("00:00", 1));
        assert_eq!(series[2], TimeBucket::new("06:00", 1));
        assert_eq!(series[3], TimeBucket::new("09:00", 1));
        assert_eq!(series[7], TimeBucket::new("21:00", 1));
        assert_eq!(series_total(&series), 4);

        let utc = hourly_counts_from_events(&events, &Utc);
        assert_eq!(utc[1], 1);
        assert_eq!(utc[23], 2);
    }

    #[test]
    fn test_hourly_counts_from_buckets() {
        let buckets = vec![
            BucketCount::new("3", 2),
            BucketCount::new("03:00", 1),
            BucketCount::new("23", 4),
            BucketCount::new("24", 9),
            BucketCount::new("noon", 9),
        ];

        let hourly = hourly_counts_from_buckets(&buckets);

        assert_eq!(hourly[3], 3);
        assert_eq!(hourly[23], 4);
        assert_eq!(hourly.iter().sum::<u64>(), 7);
    }

    #[test]
    fn test_hour_label_of_instant() {
        let at = Utc.with_ymd_and_hms(2024, 3, 15, 17, 45, 0).unwrap();
        assert_eq!(label_for(Granularity::Hour, 3, &at), "15:00");
        assert_eq!(label_for(Granularity::Hour, 6, &at), "12:00");
        assert_eq!(label_for(Granularity::Year, 3, &at), "2024");
    }

    #[test]
    fn test_weekday_counts() {
        // 2024-03-11 is a Monday, 2024-03-17 a Sunday
        let events = clicks(&[
            "2024-03-11T10:00:00Z",
            "2024-03-11T11:00:00Z",
            "2024-03-17T10:00:00Z",
            "bad",
        ]);

        let days = weekday_counts_from_events(&events, &Utc);

        assert_eq!(labels(&days), WEEKDAY_LABELS.to_vec());
        assert_eq!(days[0].count, 2);
        assert_eq!(days[6].count, 1);
    }

    #[test]
    fn test_parse_weekday_label() {
        assert_eq!(parse_weekday_label("0"), Some(6));
        assert_eq!(parse_weekday_label("7"), Some(6));
        assert_eq!(parse_weekday_label("1"), Some(0));
        assert_eq!(parse_weekday_label("Tue"), Some(1));
        assert_eq!(parse_weekday_label("saturday"), Some(5));
        assert_eq!(parse_weekday_label("9"), None);
        assert_eq!(parse_weekday_label("someday"), None);
    }

    #[test]
    fn test_weekday_counts_from_buckets() {
        let buckets = vec![
            BucketCount::new("0", 3),
            BucketCount::new("Sun", 1),
            BucketCount::new("2", 4),
        ];

        let days = weekday_counts_from_buckets(&buckets);

        assert_eq!(days[6], TimeBucket::new("Sun", 4));
        assert_eq!(days[1], TimeBucket::new("Tue", 4));
    }
}
