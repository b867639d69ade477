//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.linkstats.toml` files.

use crate::analysis::{categories::DEFAULT_TOP, uniques::DEFAULT_WINDOW_MINUTES, HOURS_PER_DAY};
use crate::cli::OutputFormat;
use crate::models::Granularity;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = ".linkstats.toml";

const MAX_DAYS: u32 = 366;
const MAX_MONTHS: u32 = 120;
const MAX_YEARS: u32 = 50;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Backend API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Trend window settings.
    #[serde(default)]
    pub window: WindowConfig,

    /// Category ranking settings.
    #[serde(default)]
    pub categories: CategoryConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Report output file. Written to stdout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Bucket in UTC instead of the local time zone.
    #[serde(default)]
    pub utc: bool,
}

/// Backend API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the link service REST API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Trend window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Trend granularity.
    #[serde(default)]
    pub granularity: Granularity,

    /// Calendar days in the daily trend.
    #[serde(default = "default_days")]
    pub days: u32,

    /// Calendar months in the monthly trend.
    #[serde(default = "default_months")]
    pub months: u32,

    /// Calendar years in the yearly trend.
    #[serde(default = "default_years")]
    pub years: u32,

    /// Width in hours of each hour-of-day window. Must divide 24.
    #[serde(default = "default_hour_step")]
    pub hour_step: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::default(),
            days: default_days(),
            months: default_months(),
            years: default_years(),
            hour_step: default_hour_step(),
        }
    }
}

fn default_days() -> u32 {
    7
}

fn default_months() -> u32 {
    12
}

fn default_years() -> u32 {
    5
}

fn default_hour_step() -> u32 {
    3
}

/// Category ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Entries kept in channel, referrer, browser and OS rankings.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Repeat window for windowed unique visitors.
    #[serde(default = "default_unique_window")]
    pub unique_window_minutes: u64,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            unique_window_minutes: default_unique_window(),
        }
    }
}

fn default_top_n() -> usize {
    DEFAULT_TOP
}

fn default_unique_window() -> u64 {
    DEFAULT_WINDOW_MINUTES
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Width in characters of the longest bar.
    #[serde(default = "default_bar_width")]
    pub bar_width: usize,

    /// Include the hour-of-day and weekday sections.
    #[serde(default = "default_true")]
    pub include_time_patterns: bool,

    /// Include the unique visitors section.
    #[serde(default = "default_true")]
    pub include_unique: bool,

    /// Note the data origin of each panel.
    #[serde(default = "default_true")]
    pub include_sources: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            bar_width: default_bar_width(),
            include_time_patterns: true,
            include_unique: true,
            include_sources: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_bar_width() -> usize {
    30
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only values the user actually passed override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref api_url) = args.api_url {
            self.api.base_url = api_url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.api.timeout_seconds = timeout;
        }

        if let Some(granularity) = args.granularity {
            self.window.granularity = granularity;
        }
        if let Some(days) = args.days {
            self.window.days = days;
        }
        if let Some(months) = args.months {
            self.window.months = months;
        }
        if let Some(years) = args.years {
            self.window.years = years;
        }
        if let Some(step) = args.hour_step {
            self.window.hour_step = step;
        }

        if let Some(top) = args.top {
            self.categories.top_n = top;
        }

        if let Some(format) = args.format {
            self.report.format = format;
        }
        if let Some(ref output) = args.output {
            self.general.output = Some(output.display().to_string());
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
        if args.utc {
            self.general.utc = true;
        }
    }

    /// Check the merged configuration for values the aggregation can't honor.
    ///
    /// `offline` is set when logs come from a file, in which case the API
    /// settings are never used and not checked.
    pub fn validate(&self, offline: bool) -> Result<()> {
        if !offline {
            let api = &self.api.base_url;
            if !api.starts_with("http://") && !api.starts_with("https://") {
                bail!("API base URL must start with 'http://' or 'https://': {}", api);
            }
            if self.api.timeout_seconds == 0 {
                bail!("Timeout must be at least 1 second");
            }
        }

        let window = &self.window;
        if window.hour_step == 0 || HOURS_PER_DAY % window.hour_step != 0 {
            bail!(
                "Hour step must divide 24 (1, 2, 3, 4, 6, 8, 12 or 24), got {}",
                window.hour_step
            );
        }
        if !(1..=MAX_DAYS).contains(&window.days) {
            bail!("Days must be between 1 and {}", MAX_DAYS);
        }
        if !(1..=MAX_MONTHS).contains(&window.months) {
            bail!("Months must be between 1 and {}", MAX_MONTHS);
        }
        if !(1..=MAX_YEARS).contains(&window.years) {
            bail!("Years must be between 1 and {}", MAX_YEARS);
        }

        if self.categories.top_n == 0 {
            bail!("Top must be at least 1");
        }
        if !(1..=200).contains(&self.report.bar_width) {
            bail!("Bar width must be between 1 and 200");
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
