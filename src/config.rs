// src/config.rs
//
// Configuration file support.
//
// TOML configuration is layered, lowest priority first:
// - built-in defaults
// - XDG config: `~/.config/image-batch/config.toml`
// - Project-local: `.image-batch.toml` (searched up the directory tree)
// - An explicit `--config FILE`
// - CLI flags (applied by the binary on top of the merged result)

use crate::engine::{DEFAULT_WORKERS, DRAIN_INTERVAL, MAX_WORKERS};
use crate::error::{BatchError, Result};
use crate::logging::LoggingConfig;
use crate::ops::{EncodeSettings, OutputFormat, ResizeMode, DEFAULT_JPEG_QUALITY};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Name of the project-local config file.
pub const PROJECT_CONFIG_NAME: &str = ".image-batch.toml";

/// Default log file, created (truncated) in the working directory.
pub const DEFAULT_LOG_FILE: &str = "image_batch.log";

/// Top-level configuration structure.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub batch: BatchConfig,
    pub encoding: EncodingConfig,
    pub logging: LoggingSection,
    pub ui: UiConfig,
}

/// What to process and how.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    /// Output format name: jpeg, png, gif, bmp or tiff.
    pub format: Option<String>,
    /// Uniform scale factor. Ignored when width and height are both set.
    pub scale: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Worker threads (1-64).
    pub workers: Option<usize>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    /// JPEG quality (1-100).
    pub jpeg_quality: Option<u8>,
    pub optimize_png: Option<bool>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Log file path. Truncated at startup.
    pub file: Option<PathBuf>,
    /// Console filter directive, e.g. "info" or "image_batch=debug".
    pub level: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UiConfig {
    /// Drain tick period in milliseconds (10-5000).
    pub tick_ms: Option<u64>,
    /// Show the progress bar.
    pub progress: Option<bool>,
}

impl AppConfig {
    /// Load and merge the XDG, project-local and explicit config files.
    ///
    /// Missing XDG or project files are skipped. An explicit file must exist.
    /// A file that exists but does not parse is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(xdg_path) = xdg_config_path() {
            if xdg_path.exists() {
                info!("Loading XDG config: {}", xdg_path.display());
                config.merge(load_file(&xdg_path)?);
            } else {
                debug!("XDG config not found: {}", xdg_path.display());
            }
        }

        if let Some(project_path) = find_project_config() {
            info!("Loading project config: {}", project_path.display());
            config.merge(load_file(&project_path)?);
        }

        if let Some(path) = explicit {
            info!("Loading config: {}", path.display());
            config.merge(load_file(path)?);
        }

        Ok(config)
    }

    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<()> {
        if let Some(q) = self.encoding.jpeg_quality {
            if !(1..=100).contains(&q) {
                return Err(BatchError::invalid_argument(
                    "encoding.jpeg_quality",
                    q.to_string(),
                    "must be between 1 and 100",
                ));
            }
        }
        if let Some(s) = self.batch.scale {
            if !s.is_finite() || s <= 0.0 {
                return Err(BatchError::invalid_argument(
                    "batch.scale",
                    s.to_string(),
                    "must be a positive number",
                ));
            }
        }
        if let Some(w) = self.batch.workers {
            if !(1..=MAX_WORKERS).contains(&w) {
                return Err(BatchError::invalid_argument(
                    "batch.workers",
                    w.to_string(),
                    format!("must be between 1 and {MAX_WORKERS}"),
                ));
            }
        }
        if let Some(t) = self.ui.tick_ms {
            if !(10..=5000).contains(&t) {
                return Err(BatchError::invalid_argument(
                    "ui.tick_ms",
                    t.to_string(),
                    "must be between 10 and 5000",
                ));
            }
        }
        if let Some(ref f) = self.batch.format {
            OutputFormat::from_str(f)
                .map_err(|reason| BatchError::invalid_argument("batch.format", f.clone(), reason))?;
        }
        Ok(())
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` when present.
    pub fn merge(&mut self, other: Self) {
        // Batch
        self.batch.input_dir = other.batch.input_dir.or_else(|| self.batch.input_dir.take());
        self.batch.output_dir = other.batch.output_dir.or_else(|| self.batch.output_dir.take());
        self.batch.format = other.batch.format.or_else(|| self.batch.format.take());
        // The resize mode is one setting: a scale and a full size replace each other
        if other.batch.scale.is_some() {
            self.batch.width = None;
            self.batch.height = None;
        } else if other.batch.width.is_some() && other.batch.height.is_some() {
            self.batch.scale = None;
        }
        self.batch.scale = other.batch.scale.or(self.batch.scale);
        self.batch.width = other.batch.width.or(self.batch.width);
        self.batch.height = other.batch.height.or(self.batch.height);
        self.batch.workers = other.batch.workers.or(self.batch.workers);

        // Encoding
        self.encoding.jpeg_quality = other.encoding.jpeg_quality.or(self.encoding.jpeg_quality);
        self.encoding.optimize_png = other.encoding.optimize_png.or(self.encoding.optimize_png);

        // Logging
        self.logging.file = other.logging.file.or_else(|| self.logging.file.take());
        self.logging.level = other.logging.level.or_else(|| self.logging.level.take());

        // UI
        self.ui.tick_ms = other.ui.tick_ms.or(self.ui.tick_ms);
        self.ui.progress = other.ui.progress.or(self.ui.progress);
    }

    // -------------------------------------------------------------------------
    // Resolved values (defaults applied)
    // -------------------------------------------------------------------------

    pub fn output_format(&self) -> Result<OutputFormat> {
        match self.batch.format {
            Some(ref f) => OutputFormat::from_str(f)
                .map_err(|reason| BatchError::invalid_argument("batch.format", f.clone(), reason)),
            None => Ok(OutputFormat::default()),
        }
    }

    /// Explicit dimensions win when both are set, otherwise the scale factor.
    pub fn resize_mode(&self) -> ResizeMode {
        match (self.batch.width, self.batch.height) {
            (Some(width), Some(height)) => ResizeMode::Explicit { width, height },
            _ => ResizeMode::ScaleFactor(self.batch.scale.unwrap_or(1.0)),
        }
    }

    pub fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            jpeg_quality: self.encoding.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            optimize_png: self.encoding.optimize_png.unwrap_or(false),
        }
    }

    pub fn workers(&self) -> usize {
        self.batch.workers.unwrap_or(DEFAULT_WORKERS)
    }

    pub fn tick_interval(&self) -> Duration {
        self.ui
            .tick_ms
            .map(Duration::from_millis)
            .unwrap_or(DRAIN_INTERVAL)
    }

    pub fn show_progress(&self) -> bool {
        self.ui.progress.unwrap_or(true)
    }

    pub fn logging_config(&self) -> LoggingConfig {
        let mut logging = LoggingConfig::default();
        if let Some(ref level) = self.logging.level {
            logging.console_level = level.clone();
        }
        logging.file = Some(
            self.logging
                .file
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
        );
        logging
    }
}

/// Get the XDG config file path.
fn xdg_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("image-batch").join("config.toml"))
}

/// Find project-local config by searching up from current directory.
fn find_project_config() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_parents(&cwd)
}

/// Search for `.image-batch.toml` in the given directory and its parents.
pub fn find_config_in_parents(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);

    while let Some(dir) = current {
        let config_path = dir.join(PROJECT_CONFIG_NAME);
        if config_path.is_file() {
            return Some(config_path);
        }
        current = dir.parent();
    }

    None
}

/// Load and parse a TOML config file.
pub fn load_file(path: &Path) -> Result<AppConfig> {
    let display = path.display().to_string();
    let content =
        std::fs::read_to_string(path).map_err(|e| BatchError::config_read(display.clone(), e))?;
    toml::from_str(&content).map_err(|e| BatchError::config_parse(display, e.to_string()))
}
