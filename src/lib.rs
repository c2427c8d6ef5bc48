// lib.rs
//
// image-batch: concurrent batch image resizer and format converter
//
// Design goals:
// - One independent transform-and-save task per input file
// - A fixed worker pool reused across batches
// - Workers never touch the presentation layer; they push events
//   to a single-consumer queue that is drained on a timer
// - A failing or panicking file never affects its siblings

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod ops;

pub use config::AppConfig;
pub use engine::{
    BatchCoordinator, BatchRequest, BatchSession, BatchStart, DrainLoop, EventDrain, Presenter,
    TickReport, WorkerPool,
};
pub use error::{BatchError, ErrorCategory, Result};
pub use events::{BatchSummary, Event, EventQueue, EventSender};
pub use ops::{BatchParameters, EncodeSettings, OutputFormat, ResizeMode, ScaleSlider};

/// Crate version, shown by the CLI.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Input file extensions accepted by the batch (lowercase, without dot).
pub fn supported_input_formats() -> Vec<String> {
    ops::ELIGIBLE_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

/// Output formats that can be written.
pub fn supported_output_formats() -> Vec<String> {
    OutputFormat::ALL
        .iter()
        .map(|format| format.extension().to_string())
        .collect()
}
