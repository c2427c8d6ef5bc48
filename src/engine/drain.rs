// src/engine/drain.rs
//
// Consumer side of the event channel.
//
// Everything here runs on the single presentation thread. Workers never call
// into a `Presenter`; they only push events, and a periodic tick drains the
// queue and applies each event in order.

use crate::engine::coordinator::{BatchCoordinator, BatchRequest, BatchStart};
use crate::engine::pool::WorkerPool;
use crate::engine::DRAIN_INTERVAL;
use crate::error::BatchError;
use crate::events::{channel, BatchSummary, Event, EventQueue, EventSender};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Info notice shown when the input folder has nothing to process.
pub const NO_ELIGIBLE_FILES: &str = "no supported image files found in the input folder";

/// Tracing target for events echoed by the drain. Console front-ends that
/// already show events can mute it without losing it from the log file.
pub const EVENTS_TARGET: &str = "image_batch::events";

/// Port to the (non thread-safe) presentation layer.
pub trait Presenter {
    /// Upper bound of the progress display.
    fn set_maximum(&mut self, maximum: u64);
    /// Absolute progress value.
    fn set_value(&mut self, value: u64);
    /// Line for the log sink.
    fn log(&mut self, message: &str);
    /// Blocking-style error notification, one per call.
    fn show_error(&mut self, message: &str);
    fn show_info(&mut self, message: &str);
    fn show_completion(&mut self, summary: &BatchSummary);
    fn set_start_enabled(&mut self, enabled: bool);
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Events applied during this tick
    pub applied: usize,
    /// A `Done` event was applied
    pub done: bool,
    /// Summary carried by that `Done`
    pub summary: Option<BatchSummary>,
}

/// Applies drained events to a presenter and tracks the progress value.
#[derive(Debug, Default)]
pub struct EventDrain {
    value: u64,
}

impl EventDrain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    /// Zero the progress value and tell the presenter.
    pub fn reset<P: Presenter + ?Sized>(&mut self, presenter: &mut P) {
        self.value = 0;
        presenter.set_value(0);
    }

    /// Drain everything queued right now and apply it. Never blocks.
    pub fn tick<P: Presenter + ?Sized>(&mut self, queue: &EventQueue, presenter: &mut P) -> TickReport {
        let mut report = TickReport::default();
        for event in queue.try_pop_all() {
            report.applied += 1;
            if let Some(summary) = self.apply(event, presenter) {
                report.done = true;
                report.summary = Some(summary);
            }
        }
        report
    }

    /// Apply one event. Returns the summary when the event was `Done`.
    pub fn apply<P: Presenter + ?Sized>(&mut self, event: Event, presenter: &mut P) -> Option<BatchSummary> {
        match event {
            Event::Progress { delta } => {
                self.value = self.value.saturating_add(delta);
                presenter.set_value(self.value);
                None
            }
            Event::Log { message } => {
                info!(target: EVENTS_TARGET, "{message}");
                presenter.log(&message);
                None
            }
            Event::Error { message } => {
                error!(target: EVENTS_TARGET, "{message}");
                presenter.show_error(&message);
                None
            }
            Event::Done { summary } => {
                info!(
                    target: EVENTS_TARGET,
                    succeeded = summary.succeeded,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    "all images processed or failed"
                );
                presenter.show_completion(&summary);
                self.reset(presenter);
                presenter.set_start_enabled(true);
                Some(summary)
            }
        }
    }
}

/// Fixed-interval driver for [`EventDrain::tick`].
#[derive(Clone, Copy, Debug)]
pub struct DrainLoop {
    interval: Duration,
}

impl Default for DrainLoop {
    fn default() -> Self {
        Self::new(DRAIN_INTERVAL)
    }
}

impl DrainLoop {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tick until a `Done` is applied and return its summary.
    ///
    /// Only call this after a start that promises a `Done` (`Started` or `Aborted`).
    pub fn run_until_done<P: Presenter + ?Sized>(
        &self,
        drain: &mut EventDrain,
        queue: &EventQueue,
        presenter: &mut P,
    ) -> BatchSummary {
        let ticker = crossbeam_channel::tick(self.interval);
        loop {
            if let Some(summary) = drain.tick(queue, presenter).summary {
                return summary;
            }
            // The ticker never disconnects while we hold it.
            let _ = ticker.recv();
        }
    }

    /// Like [`run_until_done`](Self::run_until_done) but gives up after `timeout`.
    pub fn run_for<P: Presenter + ?Sized>(
        &self,
        drain: &mut EventDrain,
        queue: &EventQueue,
        presenter: &mut P,
        timeout: Duration,
    ) -> Option<BatchSummary> {
        let deadline = Instant::now() + timeout;
        let ticker = crossbeam_channel::tick(self.interval);
        loop {
            if let Some(summary) = drain.tick(queue, presenter).summary {
                return Some(summary);
            }
            if Instant::now() >= deadline {
                warn!(?timeout, "drain loop timed out waiting for Done");
                return None;
            }
            let _ = ticker.recv_deadline(deadline);
        }
    }
}

/// Consumer-side façade: what a front-end calls when the user presses start,
/// and what its timer calls to pump events.
pub struct BatchSession<'p, P: Presenter> {
    coordinator: BatchCoordinator<'p>,
    queue: EventQueue,
    drain: EventDrain,
    presenter: P,
    running: bool,
}

impl<'p, P: Presenter> BatchSession<'p, P> {
    pub fn new(pool: &'p WorkerPool, presenter: P) -> Self {
        let (events, queue) = channel();
        Self::with_channel(pool, events, queue, presenter)
    }

    pub fn with_channel(
        pool: &'p WorkerPool,
        events: EventSender,
        queue: EventQueue,
        presenter: P,
    ) -> Self {
        Self {
            coordinator: BatchCoordinator::new(pool, events),
            queue,
            drain: EventDrain::new(),
            presenter,
            running: false,
        }
    }

    /// Handle a start request from the presentation layer.
    pub fn on_start_requested(&mut self, request: &BatchRequest) -> BatchStart {
        self.start_using(|coordinator| coordinator.start_batch(request))
    }

    fn start_using<F>(&mut self, start_batch: F) -> BatchStart
    where
        F: FnOnce(&BatchCoordinator<'p>) -> BatchStart,
    {
        if self.running {
            let err = BatchError::invalid_argument(
                "start",
                "requested",
                "a batch is already running",
            );
            self.presenter.show_error(&err.to_string());
            return BatchStart::Rejected(err);
        }

        let start = start_batch(&self.coordinator);
        match &start {
            BatchStart::Rejected(err) => self.presenter.show_error(&err.to_string()),
            BatchStart::NothingToDo => self.presenter.show_info(NO_ELIGIBLE_FILES),
            BatchStart::Started { eligible } => {
                self.presenter.set_maximum(*eligible as u64);
                self.drain.reset(&mut self.presenter);
                self.presenter.set_start_enabled(false);
                self.running = true;
            }
            BatchStart::Aborted => {
                // The queued Error and Done re-enable start on the next tick
                self.presenter.set_start_enabled(false);
                self.running = true;
            }
        }
        start
    }

    /// One timer tick.
    pub fn tick(&mut self) -> TickReport {
        let report = self.drain.tick(&self.queue, &mut self.presenter);
        if report.done {
            self.running = false;
        }
        report
    }

    /// Pump events until the running batch reports `Done`.
    /// Returns `None` when no batch is running.
    pub fn run_until_done(&mut self, drain_loop: &DrainLoop) -> Option<BatchSummary> {
        if !self.running {
            return None;
        }
        let summary = drain_loop.run_until_done(&mut self.drain, &self.queue, &mut self.presenter);
        self.running = false;
        Some(summary)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn progress(&self) -> u64 {
        self.drain.value()
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn into_presenter(self) -> P {
        self.presenter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl Presenter for Recorder {
        fn set_maximum(&mut self, maximum: u64) {
            self.calls.push(format!("max {maximum}"));
        }
        fn set_value(&mut self, value: u64) {
            self.calls.push(format!("value {value}"));
        }
        fn log(&mut self, message: &str) {
            self.calls.push(format!("log {message}"));
        }
        fn show_error(&mut self, message: &str) {
            self.calls.push(format!("error {message}"));
        }
        fn show_info(&mut self, message: &str) {
            self.calls.push(format!("info {message}"));
        }
        fn show_completion(&mut self, summary: &BatchSummary) {
            self.calls.push(format!("done {}/{}", summary.succeeded, summary.submitted));
        }
        fn set_start_enabled(&mut self, enabled: bool) {
            self.calls.push(format!("start {enabled}"));
        }
    }

    #[test]
    fn test_tick_on_empty_queue_does_nothing() {
        let (_tx, queue) = channel();
        let mut drain = EventDrain::new();
        let mut presenter = Recorder::default();
        assert_eq!(drain.tick(&queue, &mut presenter), TickReport::default());
        assert!(presenter.calls.is_empty());
    }

    #[test]
    fn test_tick_applies_events_in_order() {
        let (tx, queue) = channel();
        tx.push(Event::progress(1));
        tx.push(Event::log("processed: a.png -> a.jpeg"));
        tx.push(Event::error("failed to open image b.jpg: bad"));
        tx.push(Event::progress(1));

        let mut drain = EventDrain::new();
        let mut presenter = Recorder::default();
        let report = drain.tick(&queue, &mut presenter);

        assert_eq!(report.applied, 4);
        assert!(!report.done);
        assert_eq!(drain.value(), 2);
        assert_eq!(
            presenter.calls,
            vec![
                "value 1",
                "log processed: a.png -> a.jpeg",
                "error failed to open image b.jpg: bad",
                "value 2",
            ]
        );
    }

    #[test]
    fn test_done_resets_and_reenables_start() {
        let (tx, queue) = channel();
        let summary = BatchSummary {
            submitted: 1,
            succeeded: 1,
            ..BatchSummary::default()
        };
        tx.push(Event::progress(1));
        tx.push(Event::done(summary));

        let mut drain = EventDrain::new();
        let mut presenter = Recorder::default();
        let report = drain.tick(&queue, &mut presenter);

        assert!(report.done);
        assert_eq!(report.summary, Some(summary));
        assert_eq!(drain.value(), 0);
        assert_eq!(
            presenter.calls,
            vec!["value 1", "done 1/1", "value 0", "start true"]
        );
    }

    #[test]
    fn test_run_for_times_out_without_done() {
        let (_tx, queue) = channel();
        let mut drain = EventDrain::new();
        let mut presenter = Recorder::default();
        let result = DrainLoop::new(Duration::from_millis(5)).run_for(
            &mut drain,
            &queue,
            &mut presenter,
            Duration::from_millis(30),
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_run_until_done_returns_summary() {
        let (tx, queue) = channel();
        tx.push(Event::done(BatchSummary::default()));
        let mut drain = EventDrain::new();
        let mut presenter = Recorder::default();
        let summary = DrainLoop::new(Duration::from_millis(5)).run_until_done(
            &mut drain,
            &queue,
            &mut presenter,
        );
        assert_eq!(summary, BatchSummary::default());
    }

    #[test]
    fn test_session_rejection_and_nothing_to_do() {
        let pool = WorkerPool::new(1).unwrap();
        let mut session = BatchSession::new(&pool, Recorder::default());

        let start = session.on_start_requested(&BatchRequest::default());
        assert!(matches!(start, BatchStart::Rejected(_)));
        assert!(!session.is_running());

        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let start = session.on_start_requested(&BatchRequest::new(input.path(), output.path()));
        assert!(matches!(start, BatchStart::NothingToDo));

        let calls = &session.presenter().calls;
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("error Please choose both"));
        assert_eq!(calls[1], format!("info {NO_ELIGIBLE_FILES}"));
        assert!(session.run_until_done(&DrainLoop::default()).is_none());
    }

    #[test]
    fn test_session_aborted_batch_completes_on_next_tick() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let request = BatchRequest::new(input.path(), output.path());

        let pool = WorkerPool::new(1).unwrap();
        let mut session = BatchSession::new(&pool, Recorder::default());
        let start = session.start_using(|coordinator| {
            coordinator.start_with(&request, |dir| {
                Err(BatchError::enumeration_failed(
                    dir.display().to_string(),
                    std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                ))
            })
        });

        assert!(matches!(start, BatchStart::Aborted));
        assert!(session.is_running());
        assert_eq!(session.presenter().calls, vec!["start false"]);

        let report = session.tick();
        assert!(report.done);
        assert_eq!(report.summary, Some(BatchSummary::default()));
        assert!(!session.is_running());

        let calls = &session.presenter().calls;
        assert_eq!(calls.len(), 5);
        assert!(calls[1].starts_with("error an error occurred while preparing the batch"));
        assert_eq!(&calls[2..], ["done 0/0", "value 0", "start true"]);
    }
}
