// src/engine/tasks.rs
//
// Per-file transform tasks and batch completion tracking.
// A task runs on a pool worker, reports through the event channel and never
// lets a failure or panic escape to the worker thread.

use crate::engine::common::panic_message;
use crate::engine::decoder::open_image;
use crate::engine::encoder::encode;
use crate::engine::io::{output_file_name, write_atomic};
use crate::engine::pipeline::resize_to_target;
use crate::error::{BatchError, Stage};
use crate::events::{BatchSummary, Event, EventSender};
use crate::ops::{is_eligible, BatchParameters};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// How a single task ended. Exactly one per task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Saved; `Progress` and `Log` were emitted
    Succeeded { output_name: String },
    /// Not an eligible file; nothing was emitted
    Skipped,
    /// One `Error` event was emitted
    Failed { stage: Stage },
}

/// One file's transform-and-save unit of work.
#[derive(Clone, Debug)]
pub struct TransformTask {
    file_name: String,
    params: Arc<BatchParameters>,
}

impl TransformTask {
    pub fn new(file_name: impl Into<String>, params: Arc<BatchParameters>) -> Self {
        Self {
            file_name: file_name.into(),
            params,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn params(&self) -> &BatchParameters {
        &self.params
    }

    /// Run the task, pushing its events to `events`.
    ///
    /// On success `Progress { delta: 1 }` then `Log` are pushed, in that order.
    /// On failure a single `Error` is pushed and no `Progress`.
    pub fn run(&self, events: &EventSender) -> TaskOutcome {
        self.run_with(events, Self::transform)
    }

    /// `run` with the decode-to-write step supplied by the caller.
    fn run_with<F>(&self, events: &EventSender, transform: F) -> TaskOutcome
    where
        F: FnOnce(&Self) -> crate::error::Result<String>,
    {
        if !is_eligible(&self.file_name) {
            return TaskOutcome::Skipped;
        }

        let start = Instant::now();
        debug!(file = %self.file_name, "task started");

        let result = match catch_unwind(AssertUnwindSafe(|| transform(self))) {
            Ok(result) => result,
            Err(payload) => Err(BatchError::internal_panic(panic_message(payload.as_ref()))),
        };

        let outcome = match result {
            Ok(output_name) => {
                events.push(Event::progress(1));
                events.push(Event::log(format!(
                    "processed: {} -> {}",
                    self.file_name, output_name
                )));
                TaskOutcome::Succeeded { output_name }
            }
            Err(err) => {
                let stage = err.stage();
                debug!(file = %self.file_name, stage = stage.as_str(), error = %err, "task failed");
                events.push(Event::error(failure_message(&self.file_name, &err)));
                TaskOutcome::Failed { stage }
            }
        };

        debug!(
            file = %self.file_name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "task finished"
        );
        outcome
    }

    fn transform(&self) -> crate::error::Result<String> {
        let input_path = self.params.input_dir.join(&self.file_name);

        let (img, source_format) = open_image(&input_path)?;
        debug!(
            file = %self.file_name,
            width = img.width(),
            height = img.height(),
            color = ?img.color(),
            format = ?source_format,
            "decoded"
        );

        let resized = resize_to_target(img, &self.params.resize)?;
        let encoded = encode(&resized, self.params.format, &self.params.encoding)?;
        drop(resized);

        let output_name = output_file_name(&self.file_name, self.params.format);
        write_atomic(&self.params.output_dir, &output_name, &encoded)?;
        Ok(output_name)
    }
}

/// User-facing text for a failed task, chosen by the stage that failed.
pub fn failure_message(file_name: &str, err: &BatchError) -> String {
    match (err.stage(), err) {
        (Stage::Open, _) => format!("failed to open image {file_name}: {err}"),
        (Stage::Resize, _) => format!("failed to resize image {file_name}: {err}"),
        (Stage::Save, _) => format!("failed to save image {file_name}: {err}"),
        (Stage::Unknown, BatchError::InternalPanic { message }) => {
            format!("unexpected failure while processing {file_name}: {message}")
        }
        (Stage::Unknown, _) => {
            format!("unexpected failure while processing {file_name}: {err}")
        }
    }
}

// =============================================================================
// BATCH TRACKING
// =============================================================================

/// Outstanding-task counter shared by every task of one batch.
///
/// Initialized to the number of tasks before any is submitted. Each task
/// records its outcome after pushing its own events; the one that brings the
/// count to zero pushes `Done`. `Done` is therefore the last event of the batch.
#[derive(Debug)]
pub struct BatchTracker {
    submitted: usize,
    outstanding: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    events: EventSender,
}

impl BatchTracker {
    pub fn new(submitted: usize, events: EventSender) -> Arc<Self> {
        Arc::new(Self {
            submitted,
            outstanding: AtomicUsize::new(submitted),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            events,
        })
    }

    /// Record one finished task. Returns true for the task that completed the batch.
    pub fn record(&self, outcome: &TaskOutcome) -> bool {
        let counter = match outcome {
            TaskOutcome::Succeeded { .. } => &self.succeeded,
            TaskOutcome::Failed { .. } => &self.failed,
            TaskOutcome::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let previous = self.outstanding.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "more outcomes recorded than tasks submitted");
        if previous != 1 {
            return false;
        }

        let summary = self.summary();
        debug!(?summary, "batch complete");
        self.events.push(Event::done(summary));
        true
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            submitted: self.submitted,
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }
}

/// A task bound to its batch. This is what gets submitted to the pool.
#[derive(Debug)]
pub struct BatchJob {
    task: TransformTask,
    tracker: Arc<BatchTracker>,
}

impl BatchJob {
    pub fn new(task: TransformTask, tracker: Arc<BatchTracker>) -> Self {
        Self { task, tracker }
    }

    /// Run the task and record its outcome.
    pub fn execute(self) {
        self.execute_with(TransformTask::run)
    }

    fn execute_with<F>(self, run: F)
    where
        F: FnOnce(&TransformTask, &EventSender) -> TaskOutcome,
    {
        let mut guard = RecordOnDrop {
            tracker: &self.tracker,
            outcome: None,
        };
        guard.outcome = Some(run(&self.task, self.tracker.events()));
    }
}

/// Records the outcome when dropped, so the counter is decremented even if
/// something between run and record unwinds.
struct RecordOnDrop<'a> {
    tracker: &'a BatchTracker,
    outcome: Option<TaskOutcome>,
}

impl Drop for RecordOnDrop<'_> {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or(TaskOutcome::Failed {
            stage: Stage::Unknown,
        });
        self.tracker.record(&outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::channel;
    use crate::ops::{OutputFormat, ResizeMode};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::fs;
    use std::io::Cursor;
    use std::path::Path;

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 10, 10]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        fs::write(path, buf).unwrap();
    }

    fn params(input: &Path, output: &Path, resize: ResizeMode) -> Arc<BatchParameters> {
        BatchParameters::new(input, output, resize, OutputFormat::Jpeg).snapshot()
    }

    #[test]
    fn test_success_emits_progress_then_log() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_png(&input.path().join("a.png"), 10, 10);

        let (tx, queue) = channel();
        let task = TransformTask::new(
            "a.png",
            params(input.path(), output.path(), ResizeMode::ScaleFactor(0.5)),
        );
        let outcome = task.run(&tx);

        assert_eq!(
            outcome,
            TaskOutcome::Succeeded {
                output_name: "a.jpeg".into()
            }
        );
        assert_eq!(
            queue.try_pop_all(),
            vec![
                Event::progress(1),
                Event::log("processed: a.png -> a.jpeg")
            ]
        );
        let saved = image::open(output.path().join("a.jpeg")).unwrap();
        assert_eq!((saved.width(), saved.height()), (5, 5));
    }

    #[test]
    fn test_ineligible_file_is_skipped_silently() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(input.path().join("notes.txt"), b"hello").unwrap();

        let (tx, queue) = channel();
        let task = TransformTask::new(
            "notes.txt",
            params(input.path(), output.path(), ResizeMode::default()),
        );
        assert_eq!(task.run(&tx), TaskOutcome::Skipped);
        assert!(queue.try_pop_all().is_empty());
        assert_eq!(fs::read_dir(output.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_corrupt_file_fails_at_open() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(input.path().join("b.jpg"), b"not a jpeg at all").unwrap();

        let (tx, queue) = channel();
        let task = TransformTask::new(
            "b.jpg",
            params(input.path(), output.path(), ResizeMode::default()),
        );
        assert_eq!(task.run(&tx), TaskOutcome::Failed { stage: Stage::Open });

        let events = queue.try_pop_all();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Error { message } => {
                assert!(message.starts_with("failed to open image b.jpg: "), "{message}")
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_target_fails_at_resize() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_png(&input.path().join("dot.png"), 1, 1);

        let (tx, queue) = channel();
        let task = TransformTask::new(
            "dot.png",
            params(input.path(), output.path(), ResizeMode::ScaleFactor(0.5)),
        );
        assert_eq!(
            task.run(&tx),
            TaskOutcome::Failed {
                stage: Stage::Resize
            }
        );
        let events = queue.try_pop_all();
        assert!(matches!(
            &events[..],
            [Event::Error { message }] if message.starts_with("failed to resize image dot.png: ")
        ));
    }

    #[test]
    fn test_missing_output_dir_fails_at_save() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_png(&input.path().join("a.png"), 4, 4);
        let gone = output.path().join("gone");

        let (tx, queue) = channel();
        let task = TransformTask::new("a.png", params(input.path(), &gone, ResizeMode::default()));
        assert_eq!(task.run(&tx), TaskOutcome::Failed { stage: Stage::Save });
        let events = queue.try_pop_all();
        assert!(matches!(
            &events[..],
            [Event::Error { message }] if message.starts_with("failed to save image a.png: ")
        ));
    }

    #[test]
    fn test_failure_message_for_panic() {
        let err = BatchError::internal_panic("index out of bounds");
        assert_eq!(
            failure_message("c.png", &err),
            "unexpected failure while processing c.png: index out of bounds"
        );
    }

    #[test]
    fn test_tracker_emits_done_once_after_last_record() {
        let (tx, queue) = channel();
        let tracker = BatchTracker::new(3, tx);

        assert!(!tracker.record(&TaskOutcome::Skipped));
        assert!(!tracker.record(&TaskOutcome::Failed { stage: Stage::Open }));
        assert!(queue.try_pop_all().is_empty());
        assert_eq!(tracker.outstanding.load(Ordering::Acquire), 1);

        assert!(tracker.record(&TaskOutcome::Succeeded {
            output_name: "x.jpeg".into()
        }));
        assert_eq!(
            queue.try_pop_all(),
            vec![Event::done(BatchSummary {
                submitted: 3,
                succeeded: 1,
                failed: 1,
                skipped: 1,
            })]
        );
    }

    #[test]
    fn test_batch_job_records_outcome() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let (tx, queue) = channel();
        let tracker = BatchTracker::new(1, tx);
        let task = TransformTask::new(
            "readme.md",
            params(input.path(), output.path(), ResizeMode::default()),
        );

        BatchJob::new(task, Arc::clone(&tracker)).execute();

        assert_eq!(tracker.outstanding.load(Ordering::Acquire), 0);
        assert_eq!(
            queue.try_pop_all(),
            vec![Event::done(BatchSummary {
                submitted: 1,
                skipped: 1,
                ..BatchSummary::default()
            })]
        );
    }

    #[test]
    fn test_panicking_transform_becomes_error_event() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let (tx, queue) = channel();
        let task = TransformTask::new(
            "boom.png",
            params(input.path(), output.path(), ResizeMode::default()),
        );

        let outcome = task.run_with(&tx, |_| panic!("decoder blew up"));

        assert_eq!(
            outcome,
            TaskOutcome::Failed {
                stage: Stage::Unknown
            }
        );
        assert_eq!(
            queue.try_pop_all(),
            vec![Event::error(
                "unexpected failure while processing boom.png: decoder blew up"
            )]
        );
    }

    #[test]
    fn test_panic_in_batch_is_isolated_and_counted() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_png(&input.path().join("good.png"), 4, 4);
        let params = params(input.path(), output.path(), ResizeMode::default());

        let pool = crate::engine::pool::WorkerPool::new(2).unwrap();
        let (tx, queue) = channel();
        let tracker = BatchTracker::new(2, tx);

        let bad = BatchJob::new(
            TransformTask::new("bad.png", Arc::clone(&params)),
            Arc::clone(&tracker),
        );
        pool.submit(move || {
            bad.execute_with(|task, events| task.run_with(events, |_| panic!("worker fault")))
        });
        let good = BatchJob::new(
            TransformTask::new("good.png", Arc::clone(&params)),
            Arc::clone(&tracker),
        );
        pool.submit(move || good.execute());
        pool.wait_idle();

        let events = queue.try_pop_all();
        let errors: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::Error { message } => Some(message.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("unexpected failure while processing bad.png"));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, Event::Progress { .. }))
                .count(),
            1
        );
        assert_eq!(
            events.last(),
            Some(&Event::done(BatchSummary {
                submitted: 2,
                succeeded: 1,
                failed: 1,
                skipped: 0,
            }))
        );
        assert!(output.path().join("good.jpeg").exists());
    }

    #[test]
    fn test_job_unwinding_past_the_task_still_records() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let pool = crate::engine::pool::WorkerPool::new(1).unwrap();
        let (tx, queue) = channel();
        let tracker = BatchTracker::new(1, tx);

        let job = BatchJob::new(
            TransformTask::new(
                "a.png",
                params(input.path(), output.path(), ResizeMode::default()),
            ),
            Arc::clone(&tracker),
        );
        pool.submit(move || job.execute_with(|_, _| panic!("escaped the task")));
        pool.wait_idle();

        assert_eq!(tracker.outstanding.load(Ordering::Acquire), 0);
        assert_eq!(
            queue.try_pop_all(),
            vec![Event::done(BatchSummary {
                submitted: 1,
                failed: 1,
                ..BatchSummary::default()
            })]
        );

        // The worker survived the unwind
        let (tx, queue) = channel();
        pool.submit(move || tx.push(Event::progress(1)));
        pool.wait_idle();
        assert_eq!(queue.try_pop_all(), vec![Event::progress(1)]);
    }
}
