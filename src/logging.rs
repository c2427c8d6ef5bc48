// src/logging.rs
//
// Subscriber setup for the binary: console plus a truncated log file.
//
// The library itself only emits `tracing` events. Nothing in the pipeline
// installs a subscriber; `init` is called once from `main`.

use crate::engine::EVENTS_TARGET;
use crate::error::{BatchError, Result};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Console filter directive. `RUST_LOG` takes precedence when set.
    pub console_level: String,
    /// Log file, truncated at startup. `None` disables file logging.
    pub file: Option<PathBuf>,
    /// Everything at or above this level goes to the file.
    pub file_level: LevelFilter,
    /// Colour console output.
    pub ansi: bool,
    /// Also print drained events on the console. Off when the front-end
    /// shows them itself; the file always gets them.
    pub echo_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            console_level: "info".to_string(),
            file: None,
            file_level: LevelFilter::DEBUG,
            ansi: true,
            echo_events: false,
        }
    }
}

impl LoggingConfig {
    /// Console level for a `-v` count, `quiet` wins.
    pub fn level_for_verbosity(verbose: u8, quiet: bool) -> &'static str {
        if quiet {
            return "error";
        }
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Keeps the log file alive; syncs it to disk when dropped at process exit.
#[derive(Debug)]
pub struct LoggingGuard {
    file: Option<(PathBuf, Arc<File>)>,
    installed: bool,
}

impl LoggingGuard {
    pub fn file_path(&self) -> Option<&PathBuf> {
        self.file.as_ref().map(|(path, _)| path)
    }

    /// False when another global subscriber was already in place.
    pub fn is_installed(&self) -> bool {
        self.installed
    }
}

impl Drop for LoggingGuard {
    fn drop(&mut self) {
        if let Some((_, file)) = self.file.take() {
            let _ = (&*file).flush();
            let _ = file.sync_all();
        }
    }
}

/// Install the global subscriber.
///
/// Console output goes to stderr so it never interleaves with a progress bar
/// redraw on stdout. The file (if any) is created or truncated here.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if config.echo_events {
            EnvFilter::new(&config.console_level)
        } else {
            EnvFilter::new(format!("{},{EVENTS_TARGET}=off", config.console_level))
        }
    });
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(config.ansi)
        .with_filter(console_filter);

    let file = match config.file {
        Some(ref path) => {
            let handle = File::create(path)
                .map_err(|e| BatchError::write_failed(path.display().to_string(), e))?;
            Some((path.clone(), Arc::new(handle)))
        }
        None => None,
    };

    let file_layer = file.as_ref().map(|(_, handle)| {
        fmt::layer()
            .with_writer(Arc::clone(handle))
            .with_ansi(false)
            .with_target(true)
            .with_filter(config.file_level)
    });

    let installed = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        debug!(file = ?config.file, "logging initialized");
    }

    Ok(LoggingGuard { file, installed })
}
