//! Water Report Relay (wqr-relay) - Main entry point
//!
//! Runs the daily report workflow once and exits. Exit status is non-zero
//! only for invalid input or unreadable configuration; run errors are
//! reported in the summary and the notification.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use tracing::{error, info};

use wqr_common::config::{load_dotenv, load_or_default, ConfigOverrides, ConfigSources, RelayConfig};
use wqr_common::dates::DateRange;
use wqr_common::logging::init_logging;
use wqr_common::summary::{ErrorKind, RunSummary};
use wqr_relay::portal::webdriver::{WebDriverConfig, WebDriverSession};
use wqr_relay::{Pipeline, PipelineConfig, RunClock};

/// Command-line arguments for wqr-relay
#[derive(Parser, Debug)]
#[command(name = "wqr-relay")]
#[command(about = "Download water reports from the lab portal and relay them to SharePoint")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Single report date (YYYY-MM-DD); defaults to yesterday
    #[arg(long, conflicts_with_all = ["start_date", "end_date"])]
    date: Option<NaiveDate>,

    /// First report date (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Last report date (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<NaiveDate>,

    /// Download root directory
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// WebDriver endpoint
    #[arg(long)]
    webdriver_url: Option<String>,

    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Keep downloaded files local
    #[arg(long)]
    skip_upload: bool,

    /// Do not send the status email
    #[arg(long)]
    skip_notify: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let dotenv = load_dotenv();
    let (toml, config_file) =
        load_or_default(args.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&toml.logging).context("Failed to initialize logging")?;
    ConfigSources { dotenv, config_file }.log();

    let clock = RunClock::now();
    let overrides = ConfigOverrides {
        date_range: DateRange::from_parts(args.date, args.start_date, args.end_date)
            .context("Invalid date range")?,
        download_dir: args.download_dir,
        webdriver_url: args.webdriver_url,
        headless: args.headless.then_some(true),
    };
    let relay = RelayConfig::resolve(toml, overrides, clock.today).context("Invalid configuration")?;

    print_header(&relay, clock);

    let driver_config = WebDriverConfig::new(relay.webdriver_url.clone(), relay.download_dir.clone())
        .with_headless(relay.headless);
    let pipeline = Pipeline::new(
        relay,
        PipelineConfig {
            skip_upload: args.skip_upload,
            skip_notify: args.skip_notify,
            ..Default::default()
        },
    );

    let summary = match WebDriverSession::start(&driver_config).await {
        Ok(session) => pipeline.run(&session, clock).await,
        Err(e) => {
            let message = format!("Could not start browser session: {}", e);
            error!("{}", message);
            pipeline
                .finish(RunSummary::failed(ErrorKind::Login, message), clock)
                .await
        }
    };

    print_summary(&summary, clock);
    info!("wqr-relay finished");
    Ok(())
}

fn print_header(relay: &RelayConfig, clock: RunClock) {
    println!("{}", "=".repeat(60));
    println!("Water Report Relay");
    println!("{}", "=".repeat(60));
    println!("Start time: {}", clock.started_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Reports for: {}", relay.date_range);
    println!("Download folder: {}", relay.run_folder(clock.today).display());
    println!();
}

fn print_summary(summary: &RunSummary, clock: RunClock) {
    let finished = chrono::Local::now().naive_local();
    println!();
    println!("{}", "=".repeat(60));
    println!("Automation Summary");
    println!("{}", "=".repeat(60));
    println!("Start time: {}", clock.started_at.format("%Y-%m-%d %H:%M:%S"));
    println!("End time: {}", finished.format("%Y-%m-%d %H:%M:%S"));
    println!(
        "Reports: {} selected, {} skipped, {} indeterminate",
        summary.selection.selected, summary.selection.skipped, summary.selection.indeterminate
    );
    println!("Files downloaded: {}", summary.downloaded.len());
    println!("Files uploaded: {}", summary.uploaded.len());
    println!("Errors: {}", summary.errors.len());
    for e in &summary.errors {
        println!("  - [{}] {}", e.kind.as_str(), e.message);
    }
    println!("Status: {}", summary.outcome());
    println!("{}", "=".repeat(60));
}
