// src/engine/coordinator.rs
//
// Batch coordinator: validate a request, enumerate the input folder,
// submit one task per eligible file.

use crate::engine::io::list_eligible_files;
use crate::engine::pool::WorkerPool;
use crate::engine::tasks::{BatchJob, BatchTracker, TransformTask};
use crate::error::{BatchError, Result};
use crate::events::{BatchSummary, Event, EventSender};
use crate::ops::{BatchParameters, EncodeSettings, OutputFormat, ResizeMode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// What the presentation layer currently has selected.
///
/// `start_batch` takes a snapshot of this; editing the request afterwards
/// has no effect on the running batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchRequest {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub resize: ResizeMode,
    pub format: OutputFormat,
    pub encoding: EncodeSettings,
}

impl BatchRequest {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_resize(mut self, resize: ResizeMode) -> Self {
        self.resize = resize;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_encoding(mut self, encoding: EncodeSettings) -> Self {
        self.encoding = encoding;
        self
    }

    /// Check everything that can be checked without touching the files.
    pub fn validate(&self) -> Result<()> {
        if self.input_dir.as_os_str().is_empty() || self.output_dir.as_os_str().is_empty() {
            return Err(BatchError::missing_directory());
        }
        ensure_directory("Input", &self.input_dir)?;
        ensure_directory("Output", &self.output_dir)?;
        self.resize.validate()?;
        if !(1..=100).contains(&self.encoding.jpeg_quality) {
            return Err(BatchError::invalid_argument(
                "jpeg_quality",
                self.encoding.jpeg_quality.to_string(),
                "must be between 1 and 100",
            ));
        }
        Ok(())
    }

    fn snapshot(&self) -> Arc<BatchParameters> {
        BatchParameters::new(
            self.input_dir.clone(),
            self.output_dir.clone(),
            self.resize,
            self.format,
        )
        .with_encoding(self.encoding)
        .snapshot()
    }
}

fn ensure_directory(role: &'static str, path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(BatchError::not_a_directory(role, path.display().to_string()))
    }
}

/// Result of a start request.
#[derive(Debug)]
pub enum BatchStart {
    /// Request was invalid; nothing was submitted and no event will follow
    Rejected(BatchError),
    /// No eligible files; nothing was submitted and no event will follow
    NothingToDo,
    /// `eligible` tasks were submitted; a `Done` event will follow
    Started { eligible: usize },
    /// Enumeration failed; an `Error` and a `Done` event were queued
    Aborted,
}

impl BatchStart {
    pub fn is_started(&self) -> bool {
        matches!(self, BatchStart::Started { .. })
    }
}

pub struct BatchCoordinator<'p> {
    pool: &'p WorkerPool,
    events: EventSender,
}

impl<'p> BatchCoordinator<'p> {
    pub fn new(pool: &'p WorkerPool, events: EventSender) -> Self {
        Self { pool, events }
    }

    pub fn pool(&self) -> &'p WorkerPool {
        self.pool
    }

    /// Validate, enumerate and submit.
    ///
    /// Returns without waiting for any task. On `Started` the caller should
    /// size its progress display from `eligible` before draining events.
    pub fn start_batch(&self, request: &BatchRequest) -> BatchStart {
        self.start_with(request, list_eligible_files)
    }

    /// `start_batch` with the folder listing supplied by the caller.
    pub(crate) fn start_with<F>(&self, request: &BatchRequest, enumerate: F) -> BatchStart
    where
        F: FnOnce(&Path) -> Result<Vec<String>>,
    {
        if let Err(err) = request.validate() {
            info!(error = %err, "batch rejected");
            return BatchStart::Rejected(err);
        }

        let files = match enumerate(&request.input_dir) {
            Ok(files) => files,
            Err(err) => {
                error!(error = %err, "batch aborted during enumeration");
                self.events.push(Event::error(format!(
                    "an error occurred while preparing the batch, see the log: {err}"
                )));
                self.events.push(Event::done(BatchSummary::default()));
                return BatchStart::Aborted;
            }
        };

        if files.is_empty() {
            info!(input = %request.input_dir.display(), "no eligible files");
            return BatchStart::NothingToDo;
        }

        let eligible = files.len();
        let params = request.snapshot();
        let tracker = BatchTracker::new(eligible, self.events.clone());

        info!(
            eligible,
            input = %params.input_dir.display(),
            output = %params.output_dir.display(),
            resize = ?params.resize,
            format = %params.format,
            "batch started"
        );

        for file_name in files {
            let job = BatchJob::new(
                TransformTask::new(file_name, Arc::clone(&params)),
                Arc::clone(&tracker),
            );
            self.pool.submit(move || job.execute());
        }

        BatchStart::Started { eligible }
    }
}
