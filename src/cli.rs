//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::Granularity;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// linkstats - click analytics for short links
///
/// Buckets a link's click logs into trend, hour-of-day and weekday series,
/// ranks channels, devices, referrers, browsers and operating systems, and
/// prints the result as Markdown or JSON. Pre-aggregated statistics from the
/// backend are used when available and recomputed from raw logs otherwise.
///
/// Examples:
///   linkstats --slug promo
///   linkstats --slug https://short.example.com/r/promo --granularity month
///   linkstats --slug promo --logs ./clicks.json --granularity hour --hour-step 6
///   linkstats --slug promo --format json --output promo.json
///   linkstats --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Link to analyze: a slug, short URL or dashboard URL
    ///
    /// Not required when using --init-config.
    #[arg(short, long, value_name = "SLUG|URL", required_unless_present = "init_config")]
    pub slug: Option<String>,

    /// Base URL of the link service API
    ///
    /// Defaults to http://localhost:8080/api or the value in .linkstats.toml.
    #[arg(long, value_name = "URL", env = "LINKSTATS_API_URL")]
    pub api_url: Option<String>,

    /// Read click logs from a JSON export instead of the API
    ///
    /// Every panel is then computed locally.
    #[arg(long, value_name = "FILE")]
    pub logs: Option<PathBuf>,

    /// Trend granularity
    #[arg(short, long, value_name = "UNIT")]
    pub granularity: Option<Granularity>,

    /// Calendar days in the daily trend
    #[arg(long, value_name = "N")]
    pub days: Option<u32>,

    /// Calendar months in the monthly trend
    #[arg(long, value_name = "N")]
    pub months: Option<u32>,

    /// Calendar years in the yearly trend
    #[arg(long, value_name = "N")]
    pub years: Option<u32>,

    /// Width in hours of each hour-of-day window (must divide 24)
    #[arg(long, value_name = "HOURS")]
    pub hour_step: Option<u32>,

    /// Entries kept in channel, referrer, browser and OS rankings
    #[arg(short, long, value_name = "N")]
    pub top: Option<usize>,

    /// Output format (markdown, json)
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Output file path for the report
    ///
    /// The report is written to stdout when omitted.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .linkstats.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Bucket clicks in UTC instead of the local time zone
    #[arg(long)]
    pub utc: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .linkstats.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the slug input, empty if not set (should be validated first).
    pub fn slug_input(&self) -> &str {
        self.slug.as_deref().unwrap_or("")
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.slug_input().trim().is_empty() {
            return Err("A link slug or URL is required".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate API URL format (not needed when reading a logs file)
        if self.logs.is_none() {
            if let Some(ref api_url) = self.api_url {
                if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
                    return Err("API URL must start with 'http://' or 'https://'".to_string());
                }
            }
        }

        if let Some(step) = self.hour_step {
            if step == 0 || 24 % step != 0 {
                return Err("Hour step must divide 24 (1, 2, 3, 4, 6, 8, 12 or 24)".to_string());
            }
        }

        if self.top == Some(0) {
            return Err("Top must be at least 1".to_string());
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        // Validate logs file if provided
        if let Some(ref logs) = self.logs {
            if !logs.exists() {
                return Err(format!("Logs file does not exist: {}", logs.display()));
            }
            if !logs.is_file() {
                return Err(format!("Logs path is not a file: {}", logs.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
