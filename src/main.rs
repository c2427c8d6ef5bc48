// src/main.rs
//
// image-batch command line front-end.
//
// Resolves configuration (files, then flags), installs logging, and runs a
// single batch through a `BatchSession` driven by the periodic drain loop.

mod console;

use anyhow::{Context, Result};
use clap::Parser;
use console::ConsolePresenter;
use image_batch::config::{AppConfig, BatchConfig, EncodingConfig, LoggingSection, UiConfig};
use image_batch::engine::{normalize_dropped_path, DEFAULT_WORKERS};
use image_batch::logging::{self, LoggingConfig};
use image_batch::{
    BatchRequest, BatchSession, BatchStart, BatchSummary, DrainLoop, ScaleSlider, WorkerPool,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info, warn};

#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Resize and convert every image in a folder
#[derive(Parser, Debug)]
#[command(name = "image-batch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input folder. Drag-and-drop style values like `{C:/My Photos}` are accepted
    #[arg(short, long)]
    input: Option<String>,

    /// Output folder (must exist)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Uniform scale factor, e.g. 0.5
    #[arg(long, conflicts_with_all = ["width", "height", "slider"])]
    scale: Option<f64>,

    /// Scale as a slider position: 1-20, divided by ten
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=20), conflicts_with_all = ["width", "height"])]
    slider: Option<u8>,

    /// Target width in pixels
    #[arg(long, requires = "height")]
    width: Option<u32>,

    /// Target height in pixels
    #[arg(long, requires = "width")]
    height: Option<u32>,

    /// Output format: jpeg, png, gif, bmp or tiff
    #[arg(short, long)]
    format: Option<String>,

    /// JPEG quality (1-100)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Losslessly recompress PNG output
    #[arg(long)]
    optimize_png: bool,

    /// Worker threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Extra config file, applied after the XDG and project files
    #[arg(short, long, env = "IMAGE_BATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Log file (default: image_batch.log)
    #[arg(long, conflicts_with = "no_log_file")]
    log_file: Option<PathBuf>,

    /// Do not write a log file
    #[arg(long)]
    no_log_file: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print errors
    #[arg(long)]
    quiet: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    /// Flags as a config layer so they merge over the files.
    fn as_config(&self) -> AppConfig {
        let scale = self
            .scale
            .or_else(|| self.slider.map(|position| ScaleSlider::new(position).scale()));

        AppConfig {
            batch: BatchConfig {
                input_dir: self.input.as_deref().map(input_path),
                output_dir: self.output.clone(),
                format: self.format.clone(),
                scale,
                width: self.width,
                height: self.height,
                workers: self.workers,
            },
            encoding: EncodingConfig {
                jpeg_quality: self.quality,
                optimize_png: self.optimize_png.then_some(true),
            },
            logging: LoggingSection {
                file: self.log_file.clone(),
                level: None,
            },
            ui: UiConfig {
                tick_ms: None,
                progress: self.no_progress.then_some(false),
            },
        }
    }
}

/// Accept pasted or dropped folder names; anything else is passed through
/// and reported by request validation.
fn input_path(raw: &str) -> PathBuf {
    normalize_dropped_path(raw).unwrap_or_else(|_| PathBuf::from(raw.trim()))
}

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    /// Every file was written, or there was nothing to do.
    Success = 0,
    /// At least one file failed, or the batch was aborted.
    Failures = 1,
    /// Bad arguments or configuration; no batch ran.
    Error = 2,
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        ExitCode::from(status as u8)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return Status::Error.into();
        }
    };

    let mut logging_config = config.logging_config();
    if cli.verbose > 0 || cli.quiet {
        logging_config.console_level =
            LoggingConfig::level_for_verbosity(cli.verbose, cli.quiet).to_string();
    }
    if cli.no_log_file {
        logging_config.file = None;
    }

    let _guard = match logging::init(&logging_config).context("failed to open log file") {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e:#}");
            return Status::Error.into();
        }
    };

    match run(&cli, &config) {
        Ok(status) => status.into(),
        Err(e) => {
            eprintln!("error: {e:#}");
            Status::Error.into()
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config =
        AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    config.merge(cli.as_config());
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn run(cli: &Cli, config: &AppConfig) -> Result<Status> {
    let request = BatchRequest::new(
        config.batch.input_dir.clone().unwrap_or_default(),
        config.batch.output_dir.clone().unwrap_or_default(),
    )
    .with_resize(config.resize_mode())
    .with_format(config.output_format()?)
    .with_encoding(config.encode_settings());
    debug!(?request, "resolved request");

    let owned_pool;
    let pool = if config.workers() == DEFAULT_WORKERS {
        WorkerPool::global()?
    } else {
        owned_pool = WorkerPool::new(config.workers())?;
        &owned_pool
    };
    info!(workers = pool.workers(), "worker pool ready");

    let presenter = ConsolePresenter::new(cli.quiet, config.show_progress());
    let mut session = BatchSession::new(pool, presenter);

    let status = match session.on_start_requested(&request) {
        BatchStart::Rejected(_) => Status::Error,
        BatchStart::NothingToDo => Status::Success,
        BatchStart::Started { .. } | BatchStart::Aborted => {
            let summary = session
                .run_until_done(&DrainLoop::new(config.tick_interval()))
                .unwrap_or_default();
            status_for(&summary, session.presenter().error_count())
        }
    };

    // Tasks have all recorded their outcome once Done arrived; wait for the
    // workers to return so nothing is still writing at exit.
    pool.wait_idle();
    Ok(status)
}

fn status_for(summary: &BatchSummary, errors: usize) -> Status {
    if summary.is_clean() && errors == 0 {
        Status::Success
    } else {
        warn!(
            failed = summary.failed,
            skipped = summary.skipped,
            errors,
            "batch finished with failures"
        );
        Status::Failures
    }
}
