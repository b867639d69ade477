//! Markdown report generation.
//!
//! This module renders a [`Dashboard`] as a Markdown document with text
//! bar charts, or as pretty-printed JSON.

use crate::analysis::share;
use crate::config::ReportConfig;
use crate::models::{CategoryBucket, Dashboard, DataOrigin, LinkInfo, TimeBucket, UniqueStats};
use anyhow::Result;

const BAR_CHAR: char = '█';

/// Generate a complete Markdown report.
pub fn generate_markdown_report(dashboard: &Dashboard, config: &ReportConfig) -> String {
    let mut output = String::new();

    // Title
    output.push_str(&format!("# Link Analytics: `{}`\n\n", dashboard.slug));

    // Metadata section
    output.push_str(&generate_metadata_section(dashboard));

    if let Some(ref advisory) = dashboard.advisory {
        output.push_str(&format!("> **Note:** {}\n\n", advisory));
    }

    // Trend
    output.push_str(&generate_series_section(
        &format!("Clicks Over Time ({})", dashboard.granularity.heading()),
        &dashboard.trend,
        config.bar_width,
    ));

    if config.include_time_patterns {
        output.push_str(&generate_series_section(
            "Hour of Day",
            &dashboard.hours,
            config.bar_width,
        ));
        output.push_str(&generate_series_section(
            "Day of Week",
            &dashboard.weekdays,
            config.bar_width,
        ));
    }

    // Breakdowns
    output.push_str(&generate_category_section("Channels", &dashboard.channels, config.bar_width));
    output.push_str(&generate_category_section("Devices", &dashboard.devices, config.bar_width));
    output.push_str(&generate_category_section("Referrers", &dashboard.referrers, config.bar_width));
    output.push_str(&generate_category_section("Browsers", &dashboard.browsers, config.bar_width));
    output.push_str(&generate_category_section(
        "Operating Systems",
        &dashboard.operating_systems,
        config.bar_width,
    ));

    if config.include_unique {
        output.push_str(&generate_unique_section(&dashboard.unique));
    }

    if config.include_sources {
        output.push_str(&generate_sources_section(dashboard));
    }

    // Footer
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(dashboard: &Dashboard) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Slug:** `{}`\n", dashboard.slug));
    if let Some(ref link) = dashboard.link {
        section.push_str(&generate_link_lines(link));
    }
    section.push_str(&format!(
        "- **Generated:** {}\n",
        dashboard.generated_at.format("%Y-%m-%d %H:%M:%S %:z")
    ));
    section.push_str(&format!("- **Granularity:** {}\n", dashboard.granularity));
    section.push_str(&format!(
        "- **Total Clicks:** {}\n",
        format_count(dashboard.total_clicks)
    ));
    section.push_str(&format!(
        "- **Clicks in Window:** {}\n",
        format_count(dashboard.trend_total())
    ));
    section.push('\n');

    section
}

fn generate_link_lines(link: &LinkInfo) -> String {
    let mut lines = String::new();

    if !link.original_url.is_empty() {
        lines.push_str(&format!("- **Destination:** {}\n", link.original_url));
    }
    if !link.created_at.is_empty() {
        lines.push_str(&format!("- **Created:** {}\n", link.created_at));
    }
    if let Some(ref expires) = link.expiration_date {
        lines.push_str(&format!("- **Expires:** {}\n", expires));
    }
    lines.push_str(&format!(
        "- **Status:** {}\n",
        if link.active { "active" } else { "inactive" }
    ));

    lines
}

/// Generate a time series table.
fn generate_series_section(title: &str, buckets: &[TimeBucket], bar_width: usize) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", title));

    let max = buckets.iter().map(|b| b.count).max().unwrap_or(0);

    section.push_str("| Bucket | Clicks | |\n");
    section.push_str("|:---|---:|:---|\n");
    for bucket in buckets {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            bucket.label,
            format_count(bucket.count),
            bar(bucket.count, max, bar_width)
        ));
    }
    section.push('\n');

    section
}

/// Generate a ranked category table with shares.
fn generate_category_section(title: &str, buckets: &[CategoryBucket], bar_width: usize) -> String {
    let mut section = String::new();

    section.push_str(&format!("## {}\n\n", title));

    if buckets.is_empty() {
        section.push_str("No clicks recorded.\n\n");
        return section;
    }

    let total: u64 = buckets.iter().map(|b| b.count).sum();
    let max = buckets.iter().map(|b| b.count).max().unwrap_or(0);

    section.push_str("| # | Key | Clicks | Share | |\n");
    section.push_str("|---:|:---|---:|---:|:---|\n");
    for (i, bucket) in buckets.iter().enumerate() {
        section.push_str(&format!(
            "| {} | {} | {} | {:.1}% | {} |\n",
            i + 1,
            escape_cell(&bucket.key),
            format_count(bucket.count),
            share(bucket.count, total),
            bar(bucket.count, max, bar_width)
        ));
    }
    section.push('\n');

    section
}

/// Generate the unique visitors section.
fn generate_unique_section(unique: &UniqueStats) -> String {
    let mut section = String::new();

    section.push_str("## Unique Visitors\n\n");
    section.push_str("| Metric | Value |\n");
    section.push_str("|:---|---:|\n");
    section.push_str(&format!(
        "| Total clicks | {} |\n",
        format_count(unique.total_clicks)
    ));
    section.push_str(&format!(
        "| Distinct visitors | {} |\n",
        format_count(unique.unique_approx)
    ));
    section.push_str(&format!(
        "| Unique within {} min | {} |\n",
        unique.window_minutes,
        format_count(unique.unique_windowed)
    ));
    section.push_str(&format!(
        "| Duplicate ratio | {:.1}% |\n",
        unique.duplicate_ratio * 100.0
    ));
    section.push('\n');

    section
}

/// Generate the data source notes.
fn generate_sources_section(dashboard: &Dashboard) -> String {
    let origins = &dashboard.origins;
    let panels: [(&str, DataOrigin); 7] = [
        ("Trend", origins.trend),
        ("Hour of day", origins.hours),
        ("Day of week", origins.weekdays),
        ("Channels", origins.channels),
        ("Referrers", origins.referrers),
        ("Browsers", origins.browsers),
        ("Unique visitors", origins.unique),
    ];

    let mut section = String::new();

    section.push_str("## Data Sources\n\n");
    for (panel, origin) in panels {
        section.push_str(&format!("- **{}:** {}\n", panel, origin));
    }
    section.push_str("- **Devices, Operating systems:** computed from click logs\n\n");

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by linkstats v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Format a count with thousands separators.
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }

    out
}

/// Text bar scaled so `max` spans `width` characters.
///
/// Non-zero counts always get at least one character.
pub fn bar(count: u64, max: u64, width: usize) -> String {
    if count == 0 || max == 0 {
        return String::new();
    }

    let len = ((count as f64 / max as f64) * width as f64).round() as usize;
    BAR_CHAR.to_string().repeat(len.clamp(1, width.max(1)))
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Generate a JSON report.
pub fn generate_json_report(dashboard: &Dashboard) -> Result<String> {
    serde_json::to_string_pretty(dashboard).map_err(Into::into)
}
