//! Sumi-Archive main entry point
//!
//! This is the command-line interface for the Sumi-Archive page capturer.

use anyhow::{bail, Context};
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use sumi_archive::browser::{load_cookies_file, Browser};
use sumi_archive::capture::{BrowserCapturer, CaptureOptions};
use sumi_archive::config::{
    build_capture_options, load_config_with_hash, load_url_list, parse_flag_overrides,
    validate_scheduler_config, Config,
};
use sumi_archive::crawler::{CrawlInput, Scheduler};
use sumi_archive::output::FileOutput;
use sumi_archive::storage::{open_session_store, SessionMode};
use tracing_subscriber::EnvFilter;

/// Sumi-Archive: save complete web pages as single files
///
/// Sumi-Archive drives a Chromium-family browser over the DevTools protocol,
/// waits for each page to be ready, and saves it as a self-contained
/// document. With `--crawl-links` it follows the links it finds.
///
/// Any capture option can be given after `--`, e.g. `-- --wait-until load`.
#[derive(Parser, Debug)]
#[command(name = "sumi-archive")]
#[command(version = "1.0.0")]
#[command(about = "Save complete web pages as single files", long_about = None)]
struct Cli {
    /// URL or file path of the page to capture
    #[arg(value_name = "URL")]
    url: Option<String>,

    /// Output file (a name is derived from the page otherwise)
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Path to TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Capture profile from the configuration file
    #[arg(long, value_name = "NAME")]
    profile: Option<String>,

    /// File with one URL per line, optionally followed by capture flags
    #[arg(long, value_name = "FILE")]
    urls_file: Option<PathBuf>,

    /// DevTools endpoint of an already running browser
    #[arg(long, value_name = "URL")]
    browser_server: Option<String>,

    /// Browser executable to launch
    #[arg(long, value_name = "PATH")]
    browser_executable_path: Option<PathBuf>,

    /// Cookies as a JSON array or a Netscape cookie file
    #[arg(long, value_name = "FILE")]
    cookies_file: Option<PathBuf>,

    /// Resume a crawl from a session file that must exist
    #[arg(long, value_name = "FILE", conflicts_with_all = ["save_session", "sync_session"])]
    load_session: Option<PathBuf>,

    /// Write the crawl session to a file
    #[arg(long, value_name = "FILE", conflicts_with_all = ["load_session", "sync_session"])]
    save_session: Option<PathBuf>,

    /// Resume from a session file if present, and keep it up to date
    #[arg(long, value_name = "FILE", conflicts_with_all = ["load_session", "save_session"])]
    sync_session: Option<PathBuf>,

    /// Maximum number of pages captured at once
    #[arg(long, value_name = "N")]
    max_parallel_workers: Option<usize>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Capture options as `--flag value` pairs
    #[arg(last = true, value_name = "CAPTURE OPTIONS")]
    overrides: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    let defaults = capture_defaults(&cli, &config)?;
    apply_browser_flags(&cli, &mut config, &defaults)?;

    let inputs = collect_inputs(&cli, &defaults)?;
    let (session_path, session_mode) = session_file(&cli);
    if inputs.is_empty() && (session_path.is_none() || !session_mode.reads()) {
        bail!("Nothing to capture: give a URL, --urls-file or a session to resume");
    }
    let store = open_session_store(session_path.as_deref(), session_mode);

    let browser = Browser::open(&config.browser)
        .await
        .context("Failed to start the browser")?;
    let keep_open = config.browser.debug || defaults.debug;
    let capturer = Arc::new(BrowserCapturer::new(browser, keep_open));

    let mut scheduler = Scheduler::new(
        defaults,
        &config.scheduler,
        capturer,
        Arc::new(FileOutput::new()),
        store,
    )?;

    tracing::info!("Capturing {} URLs", inputs.len());
    let result = scheduler.capture(inputs).await;
    scheduler.finish().await;
    result?;

    let failed = scheduler
        .tasks()
        .iter()
        .filter(|task| task.error.is_some())
        .count();
    if failed > 0 {
        tracing::warn!("{} of {} captures failed", failed, scheduler.tasks().len());
    }
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_archive=info,warn"),
            1 => EnvFilter::new("sumi_archive=debug,info"),
            2 => EnvFilter::new("sumi_archive=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves the default capture options from the file, profile and flags
fn capture_defaults(cli: &Cli, config: &Config) -> anyhow::Result<CaptureOptions> {
    let mut layer = parse_flag_overrides(&cli.overrides, &CaptureOptions::default())?;
    if let Some(output) = &cli.output {
        layer.insert(
            "output".to_string(),
            Value::String(output.display().to_string()),
        );
    }

    let mut options = build_capture_options(config, cli.profile.as_deref(), &layer)?;

    if let Some(path) = &cli.cookies_file {
        let cookies = load_cookies_file(path)
            .with_context(|| format!("Failed to read cookies from {}", path.display()))?;
        tracing::debug!("Loaded {} cookies from {}", cookies.len(), path.display());
        options.cookies.extend(cookies);
    }
    Ok(options)
}

fn apply_browser_flags(
    cli: &Cli,
    config: &mut Config,
    defaults: &CaptureOptions,
) -> anyhow::Result<()> {
    if let Some(endpoint) = &cli.browser_server {
        config.browser.remote_endpoint = Some(endpoint.clone());
    }
    if let Some(path) = &cli.browser_executable_path {
        config.browser.executable_path = Some(path.clone());
    }
    if let Some(workers) = cli.max_parallel_workers {
        config.scheduler.max_parallel_workers = workers;
        validate_scheduler_config(&config.scheduler)?;
    }
    if defaults.debug {
        config.browser.debug = true;
    }
    if config.browser.user_agent.is_none() {
        config.browser.user_agent = defaults.user_agent.clone();
    }
    Ok(())
}

fn collect_inputs(cli: &Cli, defaults: &CaptureOptions) -> anyhow::Result<Vec<CrawlInput>> {
    let mut inputs = Vec::new();
    if let Some(url) = &cli.url {
        inputs.push(CrawlInput::new(url.clone()));
    }
    if let Some(path) = &cli.urls_file {
        let listed = load_url_list(path, defaults)
            .with_context(|| format!("Failed to read URL list {}", path.display()))?;
        tracing::info!("Read {} URLs from {}", listed.len(), path.display());
        inputs.extend(listed);
    }
    Ok(inputs)
}

fn session_file(cli: &Cli) -> (Option<PathBuf>, SessionMode) {
    if let Some(path) = &cli.load_session {
        (Some(path.clone()), SessionMode::Load)
    } else if let Some(path) = &cli.save_session {
        (Some(path.clone()), SessionMode::Save)
    } else if let Some(path) = &cli.sync_session {
        (Some(path.clone()), SessionMode::Sync)
    } else {
        (None, SessionMode::Save)
    }
}
