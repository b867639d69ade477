//! Visitor uniqueness computed from hashed client addresses.

use crate::models::{ClickEvent, UniqueStats};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Default repeat window for windowed uniques.
pub const DEFAULT_WINDOW_MINUTES: u64 = 30;

const MAX_WINDOW_MINUTES: i64 = 100 * 366 * 24 * 60;

/// Compute uniqueness figures from raw clicks.
///
/// A click is a windowed unique when the same `ip_hash` produced no click in
/// the `window_minutes` before it. Clicks without a hash only count toward
/// the total; hashed clicks without a parseable time count toward the
/// distinct-hash figure but not the windowed one.
pub fn unique_stats(events: &[ClickEvent], window_minutes: u64) -> UniqueStats {
    let mut by_hash: HashMap<&str, Vec<DateTime<Utc>>> = HashMap::new();
    let mut hashed = 0u64;

    for event in events {
        let Some(hash) = event.ip_hash.as_deref().map(str::trim).filter(|h| !h.is_empty()) else {
            continue;
        };
        hashed += 1;
        let times = by_hash.entry(hash).or_default();
        if let Some(at) = event.timestamp_in(&Utc) {
            times.push(at);
        }
    }

    let minutes = i64::try_from(window_minutes)
        .unwrap_or(i64::MAX)
        .min(MAX_WINDOW_MINUTES);
    let window = Duration::minutes(minutes);
    let mut windowed = 0u64;

    for times in by_hash.values_mut() {
        times.sort();
        let mut previous: Option<DateTime<Utc>> = None;
        for at in times.iter() {
            if previous.map_or(true, |prev| *at - prev >= window) {
                windowed += 1;
            }
            previous = Some(*at);
        }
    }

    let unique = by_hash.len() as u64;
    let duplicate_ratio = if hashed == 0 {
        0.0
    } else {
        1.0 - unique as f64 / hashed as f64
    };

    UniqueStats {
        total_clicks: events.len() as u64,
        unique_approx: unique,
        duplicate_ratio,
        unique_windowed: windowed,
        window_minutes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashed(hash: &str, at: &str) -> ClickEvent {
        ClickEvent {
            ip_hash: Some(hash.to_string()),
            ..ClickEvent::at(at)
        }
    }

    #[test]
    fn test_empty() {
        let stats = unique_stats(&[], DEFAULT_WINDOW_MINUTES);
        assert_eq!(stats.total_clicks, 0);
        assert_eq!(stats.unique_approx, 0);
        assert_eq!(stats.duplicate_ratio, 0.0);
        assert_eq!(stats.window_minutes, 30);
    }

    #[test]
    fn test_distinct_hashes_and_ratio() {
        let events = vec![
            hashed("a", "2024-03-15T10:00:00Z"),
            hashed("a", "2024-03-15T12:00:00Z"),
            hashed("b", "2024-03-15T10:00:00Z"),
            hashed("b", "2024-03-15T10:05:00Z"),
            ClickEvent::at("2024-03-15T10:00:00Z"),
        ];

        let stats = unique_stats(&events, 30);

        assert_eq!(stats.total_clicks, 5);
        assert_eq!(stats.unique_approx, 2);
        assert_eq!(stats.duplicate_ratio, 0.5);
        // a twice (two hours apart), b once (five minutes apart)
        assert_eq!(stats.unique_windowed, 3);
    }

    #[test]
    fn test_window_is_sliding() {
        let events = vec![
            hashed("a", "2024-03-15T10:00:00Z"),
            hashed("a", "2024-03-15T10:20:00Z"),
            hashed("a", "2024-03-15T10:40:00Z"),
            hashed("a", "2024-03-15T11:10:00Z"),
        ];

        let stats = unique_stats(&events, 30);

        assert_eq!(stats.unique_windowed, 2);
    }

    #[test]
    fn test_unordered_input() {
        let events = vec![
            hashed("a", "2024-03-15T11:00:00Z"),
            hashed("a", "2024-03-15T10:00:00Z"),
        ];
        assert_eq!(unique_stats(&events, 30).unique_windowed, 2);
        assert_eq!(unique_stats(&events, 120).unique_windowed, 1);
    }
}
