//! CLI entry point for the trip events tool.
//!
//! Provides subcommands for analyzing a single receiver log and for batch
//! processing several logs with merged stop aggregation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::Instrument;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use trip_events::{
    Config, TripReport, merge_trips,
    output::{append_record, print_json, print_summary, write_markup},
    process_log,
    source::read_log_lines,
    stats::LogStats,
};

#[derive(Parser)]
#[command(name = "trip_events")]
#[command(about = "Detect stops and turns in GPS receiver logs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a single receiver log
    Analyze {
        /// Path to the log (plain text or .gz)
        #[arg(value_name = "FILE")]
        source: String,

        /// CSV file to append per-log statistics to
        #[arg(short, long, default_value = "stats.csv")]
        stats: String,

        /// Optional: CSV file to write stop/turn/route markup to
        #[arg(short, long)]
        events: Option<String>,

        /// Optional: JSON config file
        #[arg(short, long)]
        config: Option<String>,

        /// Also log the statistics as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Process several logs concurrently and aggregate their stops
    Batch {
        /// Paths to the logs
        #[arg(value_name = "FILE", required = true)]
        files: Vec<String>,

        /// Maximum number of logs processed at once
        #[arg(short = 'j', long, default_value_t = 4)]
        concurrency: usize,

        /// CSV file to append per-log statistics to
        #[arg(short, long, default_value = "stats.csv")]
        stats: String,

        /// Optional: CSV file to write merged markup to
        #[arg(short, long)]
        events: Option<String>,

        /// Optional: JSON config file
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/trip_events.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("trip_events.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("RUST_LOG")
                .from_env_lossy(),
        );

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::DEBUG.into())
                .with_env_var("RUST_LOG_JSON")
                .from_env_lossy(),
        );

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            source,
            stats,
            events,
            config,
            json,
        } => {
            let config = load_config(config.as_deref())?;
            let lines = read_log_lines(&source)?;
            let report = process_log(&source, &lines, &config)?;

            print_summary(&report.stats);
            if json {
                print_json(&report.stats)?;
            }
            append_record(&stats, &report.stats)?;

            if let Some(events) = events {
                write_markup(&events, &report.markup_records())?;
                info!(path = %events, "Markup written");
            }
        }
        Commands::Batch {
            files,
            concurrency,
            stats,
            events,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            batch(files, concurrency, &stats, events.as_deref(), config).await?;
        }
    }

    Ok(())
}

/// Loads the config file when given, then applies environment overrides.
fn load_config(path: Option<&str>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.with_env_overrides()
}

/// Processes logs concurrently. A log that cannot be read or processed is
/// recorded as an error row and left out of the merge.
#[tracing::instrument(skip(files, config), fields(files = files.len()))]
async fn batch(
    files: Vec<String>,
    concurrency: usize,
    stats_path: &str,
    events_path: Option<&str>,
    config: Config,
) -> Result<()> {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
    let config = Arc::new(config);
    let mut tasks = Vec::with_capacity(files.len());

    for path in files {
        let sem = semaphore.clone();
        let config = config.clone();
        let log_span = tracing::info_span!("process_log_file", path = %path);

        let task = tokio::spawn(
            async move {
                let _permit = sem.acquire_owned().await.context("semaphore closed")?;
                let span = tracing::Span::current();
                tokio::task::spawn_blocking(move || {
                    let _entered = span.enter();
                    run_one(&path, &config)
                })
                .await
                .context("log task panicked")
            }
            .instrument(log_span),
        );
        tasks.push(task);
    }

    let mut reports: Vec<TripReport> = Vec::new();
    let mut failed = 0usize;

    for task in tasks {
        let outcome = match task.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(error = %e, "Log task failed");
                failed += 1;
                continue;
            }
            Err(e) => {
                error!(error = %e, "Log task aborted");
                failed += 1;
                continue;
            }
        };

        match outcome {
            Ok(report) => {
                append_record(stats_path, &report.stats)?;
                reports.push(report);
            }
            Err(error_stats) => {
                failed += 1;
                append_record(stats_path, &error_stats)?;
            }
        }
    }

    if reports.is_empty() {
        warn!(failed, "No log processed successfully");
        return Ok(());
    }

    let merged = merge_trips(&reports, &config);
    if let Some(events_path) = events_path {
        write_markup(events_path, &merged.markup_records())?;
        info!(path = events_path, "Merged markup written");
    }

    info!(
        processed = reports.len(),
        failed,
        merged_stops = merged.stops.len(),
        merged_turns = merged.turns.len(),
        "Batch finished"
    );
    Ok(())
}

/// Reads and processes one log. Failures come back as an error row.
fn run_one(path: &str, config: &Config) -> std::result::Result<TripReport, LogStats> {
    let lines = read_log_lines(path).map_err(|e| {
        error!(error = %e, "Log read failed");
        LogStats::from_error("read_error", &format!("{e:#}")).with_source(path)
    })?;

    process_log(path, &lines, config).map_err(|e| {
        error!(error = %e, "Log processing failed");
        LogStats::from_error("process_error", &format!("{e:#}")).with_source(path)
    })
}
