// src/events.rs
//
// Event channel between workers and the single consumer.
//
// Multi-producer, single-consumer, unbounded. Producers never block on push:
// a blocked worker would stall the whole pool. The consumer only ever polls,
// it never waits on the queue.

use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

/// Counts reported with the terminal `Done` event of a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Tasks submitted to the pool
    pub submitted: usize,
    /// Tasks that opened, resized and saved their file
    pub succeeded: usize,
    /// Tasks that reported an `Error` event
    pub failed: usize,
    /// Tasks that ended without any event
    pub skipped: usize,
}

impl BatchSummary {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Message from a worker (or the coordinator) to the consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// `delta` units of completed work
    Progress { delta: u64 },
    /// Informational line for the log sink
    Log { message: String },
    /// User-facing failure, one notification per event
    Error { message: String },
    /// Last event of a batch
    Done { summary: BatchSummary },
}

impl Event {
    pub fn progress(delta: u64) -> Self {
        Event::Progress { delta }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Event::Log {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Event::Error {
            message: message.into(),
        }
    }

    pub fn done(summary: BatchSummary) -> Self {
        Event::Done { summary }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Progress { .. } => "progress",
            Event::Log { .. } => "log",
            Event::Error { .. } => "error",
            Event::Done { .. } => "done",
        }
    }
}

/// Producer handle. Clone one per worker.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: Sender<Event>,
}

impl EventSender {
    /// Enqueue an event without blocking.
    ///
    /// If the consumer is gone the event is dropped; workers keep running.
    pub fn push(&self, event: Event) {
        if let Err(err) = self.tx.send(event) {
            debug!(kind = err.0.kind(), "event dropped, consumer disconnected");
        }
    }
}

/// Consumer handle. Not `Clone`: there is exactly one consumer.
#[derive(Debug)]
pub struct EventQueue {
    rx: Receiver<Event>,
}

impl EventQueue {
    /// Drain the events queued at the time of the call. Never blocks.
    ///
    /// Events pushed while draining are left for the next call, so a busy
    /// producer cannot stretch a single tick.
    pub fn try_pop_all(&self) -> Vec<Event> {
        let queued = self.rx.len();
        self.rx.try_iter().take(queued).collect()
    }

    /// Number of events waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Create the process-lifetime event channel.
pub fn channel() -> (EventSender, EventQueue) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (EventSender { tx }, EventQueue { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn try_pop_all_on_empty_queue_returns_immediately() {
        let (_tx, queue) = channel();
        assert!(queue.try_pop_all().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn try_pop_all_drains_everything_queued() {
        let (tx, queue) = channel();
        tx.push(Event::progress(1));
        tx.push(Event::log("processed: a.png -> a.png"));
        assert_eq!(queue.len(), 2);

        let events = queue.try_pop_all();
        assert_eq!(
            events,
            vec![Event::progress(1), Event::log("processed: a.png -> a.png")]
        );
        assert!(queue.try_pop_all().is_empty());
    }

    #[test]
    fn per_producer_order_is_preserved() {
        let (tx, queue) = channel();
        let producers: Vec<_> = (0..4)
            .map(|id| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for seq in 0..100 {
                        tx.push(Event::log(format!("{id}:{seq}")));
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let events = queue.try_pop_all();
        assert_eq!(events.len(), 400);

        let mut last_seen = [-1i64; 4];
        for event in events {
            let Event::Log { message } = event else {
                panic!("unexpected event kind");
            };
            let (id, seq) = message.split_once(':').unwrap();
            let id: usize = id.parse().unwrap();
            let seq: i64 = seq.parse().unwrap();
            assert!(seq > last_seen[id], "producer {id} reordered");
            last_seen[id] = seq;
        }
    }

    #[test]
    fn try_pop_all_stops_at_queued_snapshot_under_busy_producer() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let (tx, queue) = channel();
        for delta in 0..10 {
            tx.push(Event::progress(delta));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let producer = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut delta = 10;
                while !stop.load(Ordering::Relaxed) {
                    tx.push(Event::progress(delta));
                    delta += 1;
                }
            })
        };

        // Each call returns even though the producer never pauses, and
        // the sequence continues across calls without gaps.
        let mut expected = 0;
        for _ in 0..20 {
            for event in queue.try_pop_all() {
                assert_eq!(event, Event::progress(expected));
                expected += 1;
            }
        }
        assert!(expected >= 10);

        stop.store(true, Ordering::Relaxed);
        producer.join().unwrap();
    }

    #[test]
    fn push_after_consumer_dropped_does_not_panic() {
        let (tx, queue) = channel();
        drop(queue);
        tx.push(Event::error("nobody listening"));
    }

    #[test]
    fn summary_is_clean_only_without_failures() {
        let clean = BatchSummary {
            submitted: 2,
            succeeded: 2,
            ..BatchSummary::default()
        };
        assert!(clean.is_clean());
        let dirty = BatchSummary { failed: 1, ..clean };
        assert!(!dirty.is_clean());
    }
}
