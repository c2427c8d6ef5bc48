// src/engine/pool.rs
//
// Fixed-size worker pool for batch processing.
//
// **Architecture Decision**: One process-lifetime pool is reused across
// batches instead of creating a pool per batch. Threads are created once,
// and the number of files decoding at the same time is capped at the
// thread count, which bounds peak memory.
//
// - `submit` is fire-and-forget with FIFO admission (`spawn_fifo`)
// - A panic that escapes a job is logged by the pool's panic handler;
//   the worker thread keeps running
// - `wait_idle` is for shutdown and tests, never for the drain tick

use crate::engine::common::panic_message;
use crate::engine::DEFAULT_WORKERS;
use crate::error::{BatchError, Result};
use parking_lot::{Condvar, Mutex};
use rayon::ThreadPool;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, error};

/// Upper bound accepted for an explicit worker count.
pub const MAX_WORKERS: usize = 64;

static GLOBAL_POOL: OnceLock<WorkerPool> = OnceLock::new();

/// Count of queued plus running jobs, with a condvar signalled at zero.
#[derive(Debug, Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn enter(&self) {
        *self.count.lock() += 1;
    }

    fn leave(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Decrements the in-flight count when the job ends, unwinding included.
struct LeaveOnDrop(Arc<InFlight>);

impl Drop for LeaveOnDrop {
    fn drop(&mut self) {
        self.0.leave();
    }
}

pub struct WorkerPool {
    pool: ThreadPool,
    in_flight: Arc<InFlight>,
    workers: usize,
}

impl WorkerPool {
    /// Build a pool with exactly `workers` threads.
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 || workers > MAX_WORKERS {
            return Err(BatchError::invalid_argument(
                "workers",
                workers.to_string(),
                format!("must be between 1 and {MAX_WORKERS}"),
            ));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("image-batch-worker-{i}"))
            .panic_handler(|payload| {
                error!(panic = %panic_message(payload.as_ref()), "worker job panicked");
            })
            .build()
            .map_err(|e| BatchError::pool_build_failed(e.to_string()))?;

        debug!(workers, "worker pool started");
        Ok(Self {
            pool,
            in_flight: Arc::new(InFlight::default()),
            workers,
        })
    }

    /// The process-wide pool with [`DEFAULT_WORKERS`] threads, built on first use.
    pub fn global() -> Result<&'static WorkerPool> {
        if let Some(pool) = GLOBAL_POOL.get() {
            return Ok(pool);
        }
        let pool = WorkerPool::new(DEFAULT_WORKERS)?;
        // A concurrent caller may have won the race; its pool is kept and ours dropped.
        Ok(GLOBAL_POOL.get_or_init(|| pool))
    }

    /// Queue `job` and return immediately. Jobs start in submission order.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.in_flight.enter();
        let in_flight = Arc::clone(&self.in_flight);
        self.pool.spawn_fifo(move || {
            let _leave = LeaveOnDrop(in_flight);
            job();
        });
    }

    /// Jobs submitted but not yet finished.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.count.lock()
    }

    /// Block until every submitted job has finished.
    pub fn wait_idle(&self) {
        let mut count = self.in_flight.count.lock();
        while *count > 0 {
            self.in_flight.idle.wait(&mut count);
        }
    }

    /// Like [`wait_idle`](Self::wait_idle) but gives up after `timeout`.
    /// Returns true if the pool went idle.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let mut count = self.in_flight.count.lock();
        while *count > 0 {
            if self.in_flight.idle.wait_for(&mut count, timeout).timed_out() {
                return *count == 0;
            }
        }
        true
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
