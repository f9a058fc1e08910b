//! Worker pool executing submitted jobs on OS threads.
//!
//! This module provides a pool of worker threads that pull jobs from a
//! shared in-process queue. Each submitted job yields a [`JobHandle`] for
//! asynchronous result retrieval.
//!
//! # Features
//!
//! - Configurable number of workers, submit-before-start supported
//! - Runtime grow/shrink without aborting in-flight jobs
//! - Per-job panic isolation captured into the job's handle
//! - Graceful shutdown that resolves still-queued handles as cancelled
//!
//! # Shrink protocol
//!
//! Shrinking by `k` workers pushes `k` sentinel items at the *front* of the
//! queue. The next `k` workers to dequeue report their logical ids on the
//! sentinel channels and exit their loops; the pool then joins exactly
//! those threads. A job already running on a removal candidate always runs
//! to completion first, because a worker only dequeues a sentinel between
//! jobs. Logical ids are used for the match, not OS thread ids, which can
//! be reused.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::bounded;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::job::{JobHandle, QueuedJob};
use super::queue::{JobQueue, QueueError, QueueItem};

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// `start` was called more than once; treated as a programmer error.
    #[error("pool is already started")]
    AlreadyStarted,

    /// Submission after teardown has begun.
    #[error("pool queue is closed: {0}")]
    QueueClosed(#[from] QueueError),

    /// Resize below one worker.
    #[error("cannot resize pool to {0} workers; at least one is required")]
    ResizeInvalid(usize),

    /// A shrink sentinel was dropped without being executed.
    #[error("shrink sentinel was lost before any worker executed it")]
    SentinelLost,
}

/// Lifecycle of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Workers not yet spawned; jobs may already be queued.
    Constructed,
    /// Workers are serving the queue.
    Running,
    /// Teardown has begun; no new jobs are accepted.
    TearingDown,
    /// Every worker has been joined.
    Stopped,
}

struct WorkerEntry {
    id: usize,
    handle: JoinHandle<()>,
}

/// Pool of worker threads over a shared FIFO job queue.
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    workers: Vec<WorkerEntry>,
    next_worker_id: usize,
    target_workers: usize,
    state: PoolState,
}

impl WorkerPool {
    /// Creates an unstarted pool that will spawn `workers` threads on
    /// [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns `PoolError::ResizeInvalid` if `workers` is zero.
    pub fn new(workers: usize) -> Result<Self, PoolError> {
        if workers == 0 {
            return Err(PoolError::ResizeInvalid(0));
        }
        Ok(Self {
            queue: Arc::new(JobQueue::new()),
            workers: Vec::new(),
            next_worker_id: 0,
            target_workers: workers,
            state: PoolState::Constructed,
        })
    }

    /// Enqueues a job and returns its result handle.
    ///
    /// Jobs submitted before `start` wait in the queue; any panic raised
    /// during execution is captured into the handle rather than crashing
    /// the worker.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::QueueClosed` once teardown has begun.
    pub fn submit<R, F>(&self, f: F) -> Result<JobHandle<R>, PoolError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (job, handle) = QueuedJob::new(f);
        debug!(job_id = %job.id, "job submitted");
        self.queue.push_back(QueueItem::Task(job))?;
        Ok(handle)
    }

    /// Spawns the worker loops.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::AlreadyStarted` on a second call; `start` is
    /// deliberately not idempotent.
    pub fn start(&mut self) -> Result<(), PoolError> {
        if self.state != PoolState::Constructed {
            return Err(PoolError::AlreadyStarted);
        }
        for _ in 0..self.target_workers {
            self.spawn_worker();
        }
        self.state = PoolState::Running;
        info!(workers = self.workers.len(), "worker pool started");
        Ok(())
    }

    /// Advisory queue depth only; never used for synchronization.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Number of live worker threads (the configured target before start).
    pub fn worker_count(&self) -> usize {
        match self.state {
            PoolState::Constructed => self.target_workers,
            _ => self.workers.len(),
        }
    }

    /// Returns the pool's lifecycle state.
    pub fn state(&self) -> PoolState {
        self.state
    }

    /// Grows or shrinks the pool to `workers` threads.
    ///
    /// Growth spawns additional workers on the shared queue and returns
    /// once they are spawned. Shrink injects one sentinel per worker to
    /// remove at the front of the queue, waits for each sentinel's id
    /// report, then joins exactly those workers. No in-flight job is
    /// aborted.
    ///
    /// Before `start`, only the target count is adjusted.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::ResizeInvalid` for a zero target and
    /// `PoolError::QueueClosed` once teardown has begun.
    pub fn resize(&mut self, workers: usize) -> Result<(), PoolError> {
        if workers == 0 {
            return Err(PoolError::ResizeInvalid(0));
        }
        match self.state {
            PoolState::Constructed => {
                self.target_workers = workers;
                return Ok(());
            }
            PoolState::TearingDown | PoolState::Stopped => {
                return Err(PoolError::QueueClosed(QueueError::Closed));
            }
            PoolState::Running => {}
        }

        let current = self.workers.len();
        if workers == current {
            return Ok(());
        }

        if workers > current {
            info!(current, target = workers, "growing worker pool");
            for _ in current..workers {
                self.spawn_worker();
            }
            return Ok(());
        }

        let to_remove = current - workers;
        info!(current, target = workers, "shrinking worker pool");

        let mut acks = Vec::with_capacity(to_remove);
        for _ in 0..to_remove {
            let (tx, rx) = bounded(1);
            self.queue.push_front(QueueItem::Sentinel(tx))?;
            acks.push(rx);
        }

        // Wait for every sentinel to be executed before joining anything;
        // a removal candidate finishes its in-flight job first.
        let mut removed_ids = Vec::with_capacity(to_remove);
        for ack in acks {
            let id = ack.recv().map_err(|_| PoolError::SentinelLost)?;
            removed_ids.push(id);
        }

        for id in removed_ids {
            if let Some(pos) = self.workers.iter().position(|w| w.id == id) {
                let entry = self.workers.swap_remove(pos);
                if entry.handle.join().is_err() {
                    error!(worker_id = id, "worker thread panicked during shrink");
                }
                debug!(worker_id = id, "worker removed");
            }
        }
        Ok(())
    }

    /// Tears down the pool: closes the queue, resolves every
    /// queued-but-unstarted job's handle as cancelled, then wakes and
    /// joins every worker. Safe to call from any state; a second call is
    /// a no-op.
    pub fn shutdown(&mut self) {
        if self.state == PoolState::Stopped {
            return;
        }
        self.state = PoolState::TearingDown;

        let drained = self.queue.close_and_drain();
        let mut cancelled = 0usize;
        for item in drained {
            match item {
                QueueItem::Task(job) => {
                    (job.cancel)();
                    cancelled += 1;
                }
                // A sentinel can only linger here if a concurrent resize
                // was abandoned; dropping it disconnects its channel.
                QueueItem::Sentinel(_) => {}
            }
        }
        if cancelled > 0 {
            warn!(cancelled, "cancelled queued jobs during shutdown");
        }

        for entry in self.workers.drain(..) {
            if entry.handle.join().is_err() {
                error!(worker_id = entry.id, "worker thread panicked during shutdown");
            }
        }
        self.state = PoolState::Stopped;
        info!("worker pool shut down");
    }

    fn spawn_worker(&mut self) {
        let id = self.next_worker_id;
        self.next_worker_id += 1;
        let queue = Arc::clone(&self.queue);

        let handle = std::thread::Builder::new()
            .name(format!("mrsweep-worker-{id}"))
            .spawn(move || worker_loop(id, queue))
            .expect("failed to spawn worker thread");

        self.workers.push(WorkerEntry { id, handle });
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Main worker loop: blocking pop until the queue closes or a shrink
/// sentinel selects this worker for removal.
fn worker_loop(id: usize, queue: Arc<JobQueue>) {
    debug!(worker_id = id, "worker started");
    while let Some(item) = queue.pop_blocking() {
        match item {
            QueueItem::Task(job) => {
                debug!(worker_id = id, job_id = %job.id, "job started");
                (job.run)();
                debug!(worker_id = id, job_id = %job.id, "job finished");
            }
            QueueItem::Sentinel(ack) => {
                // Report our logical id so the pool joins this thread.
                let _ = ack.send(id);
                debug!(worker_id = id, "worker leaving pool on shrink sentinel");
                return;
            }
        }
    }
    debug!(worker_id = id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::{wait_any, JobError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_zero_workers_is_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(PoolError::ResizeInvalid(0))));
    }

    #[test]
    fn test_jobs_submitted_before_start_each_run_exactly_once() {
        let executions = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new(3).expect("non-zero workers");

        let n = 32;
        let mut handles = Vec::with_capacity(n);
        for i in 0..n {
            let executions = Arc::clone(&executions);
            let handle = pool
                .submit(move || {
                    executions.fetch_add(1, Ordering::SeqCst);
                    i
                })
                .expect("pool accepts jobs before start");
            handles.push(handle);
        }

        pool.start().expect("first start succeeds");

        let mut seen = vec![false; n];
        for handle in handles {
            let value = handle.wait().expect("job should succeed");
            assert!(!seen[value], "job {value} resolved twice");
            seen[value] = true;
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(executions.load(Ordering::SeqCst), n);
    }

    #[test]
    fn test_double_start_fails() {
        let mut pool = WorkerPool::new(1).expect("non-zero workers");
        pool.start().expect("first start succeeds");
        assert!(matches!(pool.start(), Err(PoolError::AlreadyStarted)));
    }

    #[test]
    fn test_submit_after_shutdown_fails_with_queue_closed() {
        let mut pool = WorkerPool::new(1).expect("non-zero workers");
        pool.start().expect("first start succeeds");
        pool.shutdown();
        assert!(matches!(pool.submit(|| 1), Err(PoolError::QueueClosed(_))));
    }

    #[test]
    fn test_panicking_job_does_not_affect_siblings() {
        let mut pool = WorkerPool::new(1).expect("non-zero workers");
        let bad = pool.submit(|| -> u32 { panic!("deliberate") }).expect("open");
        let good = pool.submit(|| 7u32).expect("open");
        pool.start().expect("first start succeeds");

        assert!(matches!(bad.wait(), Err(JobError::Panicked(_))));
        assert_eq!(good.wait(), Ok(7));
    }

    #[test]
    fn test_resize_zero_is_invalid() {
        let mut pool = WorkerPool::new(2).expect("non-zero workers");
        assert!(matches!(pool.resize(0), Err(PoolError::ResizeInvalid(0))));
    }

    #[test]
    fn test_grow_adds_workers_that_serve_the_queue() {
        let mut pool = WorkerPool::new(1).expect("non-zero workers");
        pool.start().expect("first start succeeds");
        pool.resize(3).expect("growth succeeds");
        assert_eq!(pool.worker_count(), 3);

        let handles: Vec<_> = (0..6)
            .map(|i| pool.submit(move || i).expect("open queue"))
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.wait(), Ok(i));
        }
    }

    #[test]
    fn test_shrink_never_aborts_in_flight_jobs() {
        let completed = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new(4).expect("non-zero workers");
        pool.start().expect("first start succeeds");

        let mut handles = Vec::new();
        for _ in 0..4 {
            let completed = Arc::clone(&completed);
            handles.push(
                pool.submit(move || {
                    std::thread::sleep(Duration::from_millis(100));
                    completed.fetch_add(1, Ordering::SeqCst);
                })
                .expect("open queue"),
            );
        }

        // All four jobs are (or will shortly be) in flight; the shrink must
        // wait for enough of them to finish rather than aborting any.
        pool.resize(1).expect("shrink succeeds");
        assert_eq!(pool.worker_count(), 1);

        for handle in handles {
            handle.wait().expect("job should complete");
        }
        assert_eq!(completed.load(Ordering::SeqCst), 4);

        // The surviving worker still serves new jobs.
        let after = pool.submit(|| 11u32).expect("open queue");
        assert_eq!(after.wait(), Ok(11));
    }

    #[test]
    fn test_shutdown_cancels_queued_jobs() {
        let mut pool = WorkerPool::new(1).expect("non-zero workers");
        // Never started: everything stays queued.
        let handle = pool.submit(|| 5u32).expect("open queue");
        pool.shutdown();

        assert_eq!(handle.wait(), Err(JobError::Cancelled));
        assert_eq!(pool.state(), PoolState::Stopped);
    }

    #[test]
    fn test_wait_any_drains_a_running_pool() {
        let mut pool = WorkerPool::new(2).expect("non-zero workers");
        let mut handles: Vec<_> = (0..5)
            .map(|i| pool.submit(move || i * 2).expect("open queue"))
            .collect();
        pool.start().expect("first start succeeds");

        let mut results = Vec::new();
        while !handles.is_empty() {
            if let Some((_, outcome)) = wait_any(&mut handles, Duration::from_secs(5)) {
                results.push(outcome.expect("job should succeed"));
            }
        }
        results.sort_unstable();
        assert_eq!(results, vec![0, 2, 4, 6, 8]);
    }
}
