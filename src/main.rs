//! `kodegen-sitecapture`: search a list of companies on a list of sites and
//! keep a screenshot of every result page.
//!
//! Reads a job file, runs one capture run with a local Chrome, prints progress
//! as it happens and the run directory at the end.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kodegen_tools_sitecapture::config::env::parse_bool;
use kodegen_tools_sitecapture::{
    CaptureConfig, CaptureService, ChromiumDriver, ProgressPublisher, ProgressSnapshot,
    SiteDescriptor,
};

#[derive(Parser, Debug)]
#[command(
    name = "kodegen-sitecapture",
    version,
    about = "Search companies across sites and capture the result pages"
)]
struct Args {
    /// Job file: {"companies": [...], "websites": [...], "queryDate"?: RFC3339}
    #[arg(long)]
    job: PathBuf,

    /// Query time stamped on every capture (defaults to the job's queryDate, then now)
    #[arg(long, value_parser = parse_rfc3339)]
    as_of: Option<DateTime<Utc>>,

    /// Print one JSON progress snapshot per line on stdout
    #[arg(long)]
    json: bool,

    /// Replay every failed task once after the run
    #[arg(long)]
    retry_failed: bool,

    /// Show the browser window (overrides HEADLESS)
    #[arg(long)]
    headed: bool,

    /// Tasks per wave (overrides MAX_CONCURRENT_TASKS)
    #[arg(long)]
    concurrency: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobFile {
    companies: Vec<String>,
    websites: Vec<SiteDescriptor>,
    #[serde(default)]
    query_date: Option<DateTime<Utc>>,
}

fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

fn init_tracing() {
    let debug = std::env::var("DEBUG").is_ok_and(|v| parse_bool(&v));
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn print_snapshot(snapshot: &ProgressSnapshot, json: bool) {
    if json {
        match serde_json::to_string(snapshot) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("Could not serialize progress snapshot: {e}"),
        }
        return;
    }
    let current = snapshot
        .current_task
        .as_ref()
        .map(|t| format!(" | now: {} @ {}", t.entity, t.site.name))
        .unwrap_or_default();
    eprintln!(
        "[{}/{}] done, {} failed{}",
        snapshot.completed + snapshot.failed,
        snapshot.total,
        snapshot.failed,
        current
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so RUST_LOG and DEBUG from it apply
    let _ = dotenvy::dotenv();
    init_tracing();
    let args = Args::parse();

    let job_text = tokio::fs::read_to_string(&args.job)
        .await
        .with_context(|| format!("Failed to read job file {}", args.job.display()))?;
    let job: JobFile = serde_json::from_str(&job_text)
        .with_context(|| format!("Invalid job file {}", args.job.display()))?;

    let mut config = CaptureConfig::from_env()?;
    if args.headed {
        config = config.with_headless(false);
    }
    if let Some(limit) = args.concurrency {
        config = config.with_max_concurrent_tasks(limit);
    }
    config.validate()?;

    let as_of = args.as_of.or(job.query_date).unwrap_or_else(Utc::now);
    info!(
        companies = job.companies.len(),
        websites = job.websites.len(),
        storage = %config.storage_dir().display(),
        "Starting capture run"
    );

    let publisher = Arc::new(ProgressPublisher::new());
    let json = args.json;
    publisher.subscribe_fn(move |snapshot: &ProgressSnapshot| print_snapshot(snapshot, json));

    let driver = Arc::new(ChromiumDriver::new(&config));
    let service = CaptureService::new(config, driver, publisher);

    let run_dir = service
        .start_run(&job.companies, &job.websites, as_of)
        .await
        .context("Capture run failed")?;

    if args.retry_failed {
        let failed = service.failed_task_ids();
        if !failed.is_empty() {
            info!("Retrying {} failed task(s)", failed.len());
            service
                .retry_tasks(&failed)
                .await
                .context("Retry of failed tasks failed")?;
        }
    }

    if let Some(summary) = service.progress() {
        info!(
            completed = summary.completed,
            failed = summary.failed,
            total = summary.total,
            "Run complete"
        );
    }
    println!("{}", run_dir.display());
    Ok(())
}
