// src/ops.rs
//
// Batch parameters and output formats.
// These are cheap to create and share - the expensive work happens on the workers.

use crate::error::{BatchError, Result};
use image::ImageFormat;
use std::path::PathBuf;
use std::sync::Arc;

/// File name suffixes accepted as input (matched case-insensitively).
pub const ELIGIBLE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tiff"];

/// Default JPEG quality, matches the common libjpeg default.
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// Returns true when `file_name` ends with one of the eligible extensions.
///
/// Matching is done on the lowercased name suffix, so `PHOTO.JPG` and
/// `.png` are both eligible while `archive.png.zip` is not.
pub fn is_eligible(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    ELIGIBLE_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

/// How each image is resized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ResizeMode {
    /// Uniform scale applied to both axes, floored: `new = floor(orig * factor)`
    ScaleFactor(f64),
    /// Exact output size, aspect ratio is not preserved
    Explicit { width: u32, height: u32 },
}

impl ResizeMode {
    /// Reject parameters that can never produce an image.
    pub fn validate(&self) -> Result<()> {
        match *self {
            ResizeMode::ScaleFactor(factor) => {
                if !factor.is_finite() || factor <= 0.0 {
                    return Err(BatchError::invalid_resize(format!(
                        "scale factor must be a positive number, got {factor}"
                    )));
                }
            }
            ResizeMode::Explicit { width, height } => {
                if width == 0 || height == 0 {
                    return Err(BatchError::invalid_resize(format!(
                        "width and height must be positive, got {width}x{height}"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for ResizeMode {
    fn default() -> Self {
        ResizeMode::ScaleFactor(1.0)
    }
}

/// Output format for encoding
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::Gif,
        OutputFormat::Bmp,
        OutputFormat::Tiff,
    ];

    pub fn from_str(format: &str) -> std::result::Result<Self, String> {
        match format.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "gif" => Ok(Self::Gif),
            "bmp" => Ok(Self::Bmp),
            "tiff" | "tif" => Ok(Self::Tiff),
            other => Err(format!("unsupported format: {other}")),
        }
    }

    /// Lowercase format name, also used as the output file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Gif => "gif",
            OutputFormat::Bmp => "bmp",
            OutputFormat::Tiff => "tiff",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Gif => ImageFormat::Gif,
            OutputFormat::Bmp => ImageFormat::Bmp,
            OutputFormat::Tiff => ImageFormat::Tiff,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.extension().to_uppercase())
    }
}

/// Encoder knobs that do not change the output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeSettings {
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Recompress PNG output losslessly with oxipng
    pub optimize_png: bool,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            optimize_png: false,
        }
    }
}

/// Immutable snapshot of everything a task needs.
///
/// Taken once when a batch starts and shared by every task of that batch.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchParameters {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub resize: ResizeMode,
    pub format: OutputFormat,
    pub encoding: EncodeSettings,
}

impl BatchParameters {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        resize: ResizeMode,
        format: OutputFormat,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            resize,
            format,
            encoding: EncodeSettings::default(),
        }
    }

    pub fn with_encoding(mut self, encoding: EncodeSettings) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn snapshot(&self) -> Arc<BatchParameters> {
        Arc::new(self.clone())
    }
}

// =============================================================================
// SCALE SLIDER - the 1..=20 slider of the desktop front-end
// =============================================================================

/// Integer slider position mapped to a scale factor of `position / 10`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScaleSlider(u8);

impl ScaleSlider {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 20;

    /// Clamp into the slider range.
    pub fn new(position: u8) -> Self {
        Self(position.clamp(Self::MIN, Self::MAX))
    }

    pub fn position(&self) -> u8 {
        self.0
    }

    pub fn scale(&self) -> f64 {
        f64::from(self.0) / 10.0
    }
}

impl Default for ScaleSlider {
    fn default() -> Self {
        Self(10)
    }
}

/// Render a scale factor as the percentage label shown next to the slider.
pub fn scale_percent_label(scale: f64) -> String {
    format!("{}%", (scale * 100.0).round() as i64)
}
