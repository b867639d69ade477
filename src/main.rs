//! linkstats - click analytics for short links
//!
//! A CLI tool that buckets a short link's click logs into time series and
//! category rankings, preferring the backend's pre-aggregated statistics
//! and recomputing from raw logs when they are unavailable.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime or validation error (bad flags, config, unreachable output, etc.)

mod analysis;
mod cli;
mod config;
mod dashboard;
mod models;
mod report;
mod source;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use cli::{Args, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use dashboard::{DashboardService, Selection};
use models::Dashboard;
use source::{AnalyticsSource, FileSource, HttpSource};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("linkstats v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .linkstats.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize the API URL, windows, rankings and report.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// Logs go to stderr so the report can be piped from stdout.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete workflow. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config
        .validate(args.logs.is_some())
        .context("Invalid configuration")?;

    let slug = source::resolve_slug(args.slug_input())
        .with_context(|| format!("Could not determine link from '{}'", args.slug_input()))?;

    // Step 1: Pick the data source
    let source: Arc<dyn AnalyticsSource> = match args.logs {
        Some(ref path) => {
            if !args.quiet {
                eprintln!("📂 Reading click logs: {}", path.display());
            }
            Arc::new(FileSource::new(path))
        }
        None => {
            if !args.quiet {
                eprintln!("🌐 Fetching analytics from: {}", config.api.base_url);
            }
            Arc::new(
                HttpSource::new(&config.api.base_url, config.api.timeout_seconds)
                    .context("Failed to create API client")?,
            )
        }
    };

    // Step 2: Assemble the dashboard
    let selection = Selection::from(&config);
    if !args.quiet {
        eprintln!(
            "📊 Aggregating {} clicks for '{}' ({} view)...",
            if config.general.utc { "UTC" } else { "local-time" },
            slug,
            selection.granularity
        );
    }

    let service = DashboardService::new(source);
    let loaded = if config.general.utc {
        service.load(&slug, &selection, Utc::now()).await
    } else {
        service.load(&slug, &selection, Local::now()).await
    };
    let dashboard = loaded.context("Request was superseded before it completed")?;

    if let Some(ref advisory) = dashboard.advisory {
        warn!("{}", advisory);
        if !args.quiet {
            eprintln!("⚠️  {}", advisory);
        }
    }

    // Step 3: Render and write the report
    let output = match config.report.format {
        OutputFormat::Json => report::generate_json_report(&dashboard)?,
        OutputFormat::Markdown => report::generate_markdown_report(&dashboard, &config.report),
    };

    match config.general.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path))?;
            info!("Report saved to {}", path);
        }
        None => print!("{}", output),
    }

    if !args.quiet {
        print_summary(&dashboard, start_time.elapsed().as_secs_f64());
    }

    Ok(0)
}

/// Print a short summary to stderr.
fn print_summary(dashboard: &Dashboard, duration: f64) {
    eprintln!("\n📈 Summary for '{}':", dashboard.slug);
    eprintln!(
        "   Total clicks: {}",
        report::format_count(dashboard.total_clicks)
    );
    eprintln!(
        "   In {} window: {}",
        dashboard.granularity,
        report::format_count(dashboard.trend_total())
    );
    if let Some(top) = dashboard.channels.first() {
        eprintln!("   Top channel: {} ({})", top.key, top.count);
    }
    eprintln!(
        "   Distinct visitors: {}",
        report::format_count(dashboard.unique.unique_approx)
    );
    eprintln!("   Duration: {:.1}s", duration);
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
