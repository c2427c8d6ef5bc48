// src/error.rs
//
// Unified error handling for image-batch
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - Validation: Bad batch request, surfaced before any task is submitted
// - PerFile: One file failed to open/resize/save, isolated to its task
// - Systemic: The batch itself could not be set up (enumeration, pool)
// - Config: Configuration file could not be read or parsed

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used to decide how an error is surfaced.
///
/// - Validation: reported synchronously, no partial work
/// - PerFile: reported as one `Error` event, siblings keep running
/// - Systemic: reported as one `Error` event followed by `Done`
/// - Config: startup failure of the front-end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    PerFile,
    Systemic,
    Config,
}

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Open,
    Resize,
    Save,
    Unknown,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Open => "open",
            Stage::Resize => "resize",
            Stage::Save => "save",
            Stage::Unknown => "unknown",
        }
    }
}

/// image-batch error types
#[derive(Debug, Error)]
pub enum BatchError {
    // Validation Errors
    #[error("Please choose both an input and an output folder")]
    MissingDirectory,

    #[error("{role} folder does not exist or is not a directory: {path}")]
    NotADirectory {
        role: Cow<'static, str>,
        path: Cow<'static, str>,
    },

    #[error("Invalid resize parameters: {reason}")]
    InvalidResize { reason: Cow<'static, str> },

    #[error("Please drop a folder, not a file: {path}")]
    InvalidDroppedPath { path: Cow<'static, str> },

    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Open Errors
    #[error("Failed to read file '{path}': {source}")]
    OpenFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Resize Errors
    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    // Save Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Systemic Errors
    #[error("Failed to list input folder '{path}': {source}")]
    EnumerationFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build worker pool: {message}")]
    PoolBuildFailed { message: Cow<'static, str> },

    // Config Errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {message}")]
    ConfigParse {
        path: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

// Constructor Helpers
impl BatchError {
    pub fn missing_directory() -> Self {
        Self::MissingDirectory
    }

    pub fn not_a_directory(
        role: impl Into<Cow<'static, str>>,
        path: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::NotADirectory {
            role: role.into(),
            path: path.into(),
        }
    }

    pub fn invalid_resize(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidResize {
            reason: reason.into(),
        }
    }

    pub fn invalid_dropped_path(path: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidDroppedPath { path: path.into() }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn open_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::OpenFailed {
            path: path.into(),
            source,
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn write_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::WriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn enumeration_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::EnumerationFailed {
            path: path.into(),
            source,
        }
    }

    pub fn pool_build_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::PoolBuildFailed {
            message: message.into(),
        }
    }

    pub fn config_read(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::ConfigRead {
            path: path.into(),
            source,
        }
    }

    pub fn config_parse(
        path: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ConfigParse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingDirectory
            | Self::NotADirectory { .. }
            | Self::InvalidResize { .. }
            | Self::InvalidDroppedPath { .. }
            | Self::InvalidArgument { .. } => ErrorCategory::Validation,

            Self::OpenFailed { .. }
            | Self::DecodeFailed { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::ResizeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::WriteFailed { .. }
            | Self::InternalPanic { .. } => ErrorCategory::PerFile,

            Self::EnumerationFailed { .. } | Self::PoolBuildFailed { .. } => {
                ErrorCategory::Systemic
            }

            Self::ConfigRead { .. } | Self::ConfigParse { .. } => ErrorCategory::Config,
        }
    }

    /// Pipeline stage this error is raised from by default.
    /// Limit errors on a computed target are re-tagged as `Resize` by the caller.
    pub fn stage(&self) -> Stage {
        match self {
            Self::OpenFailed { .. }
            | Self::DecodeFailed { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. } => Stage::Open,
            Self::ResizeFailed { .. } => Stage::Resize,
            Self::EncodeFailed { .. } | Self::WriteFailed { .. } => Stage::Save,
            _ => Stage::Unknown,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, BatchError>;
