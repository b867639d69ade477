//! Categorical aggregation of clicks (channel, device, referrer, browser, OS).
//!
//! Rankings are deterministic: keys are tallied in first-seen order and a
//! stable sort by descending count keeps that order for ties.

use crate::models::{CategoryBucket, ClickEvent, Dimension, KeyCount};
use reqwest::Url;
use std::collections::HashMap;

/// Default number of entries kept in a capped ranking.
pub const DEFAULT_TOP: usize = 8;

/// Insertion-ordered tally of category counts.
#[derive(Debug, Default)]
pub struct Tally {
    buckets: Vec<CategoryBucket>,
    index: HashMap<String, usize>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` to `key`, registering the key on first sight.
    pub fn add(&mut self, key: &str, count: u64) {
        match self.index.get(key) {
            Some(&i) => self.buckets[i].count += count,
            None => {
                self.index.insert(key.to_string(), self.buckets.len());
                self.buckets.push(CategoryBucket::new(key, count));
            }
        }
    }

    /// Sort by descending count (ties keep first-seen order) and cap to `top`.
    ///
    /// Entries beyond `top` are discarded.
    pub fn into_ranked(self, top: Option<usize>) -> Vec<CategoryBucket> {
        let mut ranked = self.buckets;
        ranked.sort_by_key(|bucket| std::cmp::Reverse(bucket.count));
        if let Some(n) = top {
            ranked.truncate(n);
        }
        ranked
    }
}

/// Host (with port, if any) of a referrer URL.
///
/// Values that don't parse as URLs are returned verbatim; URLs without a
/// host and blank values yield `None`.
pub fn referrer_host(referrer: &str) -> Option<String> {
    let referrer = referrer.trim();
    if referrer.is_empty() {
        return None;
    }

    match Url::parse(referrer) {
        Ok(url) => {
            let host = url.host_str().filter(|h| !h.is_empty())?;
            Some(match url.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            })
        }
        Err(_) => Some(referrer.to_string()),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Category key of a click for one dimension.
///
/// Never empty: clicks without a value resolve to the dimension's default.
pub fn category_key(event: &ClickEvent, dimension: Dimension) -> String {
    let from_referrer = || event.referrer.as_deref().and_then(referrer_host);

    let key = match dimension {
        Dimension::Channel => non_empty(&event.channel).or_else(from_referrer),
        Dimension::Referrer => from_referrer(),
        Dimension::Device => non_empty(&event.device_type),
        Dimension::Browser => non_empty(&event.browser),
        Dimension::Os => non_empty(&event.os),
    };

    key.unwrap_or_else(|| dimension.default_key().to_string())
}

/// Rank a stream of keys by frequency.
pub fn rank<I, S>(keys: I, top: Option<usize>) -> Vec<CategoryBucket>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tally = Tally::new();
    for key in keys {
        tally.add(key.as_ref(), 1);
    }
    tally.into_ranked(top)
}

/// Re-rank counts that were already summed elsewhere.
///
/// Duplicate keys are merged and blank keys map to the dimension default,
/// so remote lists take the same shape as locally computed ones.
pub fn rank_counts(pairs: &[KeyCount], dimension: Dimension, top: Option<usize>) -> Vec<CategoryBucket> {
    let mut tally = Tally::new();
    for pair in pairs {
        let key = pair.key.trim();
        let key = if key.is_empty() {
            dimension.default_key()
        } else {
            key
        };
        tally.add(key, pair.count);
    }
    tally.into_ranked(top)
}

/// Group clicks by a dimension and rank them.
pub fn aggregate(events: &[ClickEvent], dimension: Dimension, top: Option<usize>) -> Vec<CategoryBucket> {
    rank(events.iter().map(|e| category_key(e, dimension)), top)
}

/// Share of `count` in `total` as a percentage.
pub fn share(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}
