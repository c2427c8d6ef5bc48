// src/engine.rs
//
// The core of image-batch. A concurrent batch pipeline that:
// 1. Validates a request and enumerates the input folder
// 2. Runs one transform-and-save task per file on a fixed worker pool
// 3. Reports back through a single-consumer event queue drained on a timer
//
// This file is a facade that re-exports the modules in engine/

use std::time::Duration;

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// SCHEDULING
// =============================================================================

/// Worker threads in the shared pool.
pub const DEFAULT_WORKERS: usize = 4;

/// Period of the consumer-side drain tick.
pub const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod common;
mod coordinator;
mod decoder;
mod drain;
mod encoder;
mod io;
mod pipeline;
mod pool;
mod tasks;

pub use coordinator::{BatchCoordinator, BatchRequest, BatchStart};
pub use decoder::{check_dimensions, decode_image};
pub use drain::{BatchSession, DrainLoop, EventDrain, Presenter, TickReport, EVENTS_TARGET};
pub use encoder::encode;
pub use io::{list_eligible_files, normalize_dropped_path, output_file_name};
pub use pipeline::{resize_to_target, target_dimensions};
pub use pool::{WorkerPool, MAX_WORKERS};
pub use tasks::{TaskOutcome, TransformTask};
