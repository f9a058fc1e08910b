//! Job and result-handle types for the scheduler.
//!
//! A submitted job is an opaque closure paired with exactly one
//! [`JobHandle`]. The worker that executes the job resolves the handle with
//! the closure's return value, or with [`JobError::Panicked`] if the closure
//! panicked. Handles for jobs that were still queued when the pool shut down
//! are resolved with [`JobError::Cancelled`] instead of being dropped
//! silently.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use thiserror::Error;
use uuid::Uuid;

/// How often `wait_any` re-polls its handles.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors that resolve a job handle without a value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// The job closure panicked; the payload message is preserved.
    #[error("job panicked: {0}")]
    Panicked(String),

    /// The pool shut down before the job started executing.
    #[error("job was cancelled before execution")]
    Cancelled,
}

/// Outcome of one job: its return value or the error that resolved it.
pub type JobOutcome<R> = Result<R, JobError>;

/// Caller-side handle for one submitted job.
///
/// Transitions Pending -> Ready(value) | Errored(cause) exactly once. The
/// scheduler owns the matching sender; the handle is released when both
/// sides drop it.
#[derive(Debug)]
pub struct JobHandle<R> {
    id: Uuid,
    rx: Receiver<JobOutcome<R>>,
}

impl<R> JobHandle<R> {
    /// Returns the job's unique identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Non-blocking poll. Returns the outcome once, `None` while pending.
    pub fn try_outcome(&self) -> Option<JobOutcome<R>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            // Sender dropped without resolving: only possible if the pool
            // was torn down abnormally. Surface it as a cancellation.
            Err(TryRecvError::Disconnected) => Some(Err(JobError::Cancelled)),
        }
    }

    /// Blocks until the job resolves.
    pub fn wait(self) -> JobOutcome<R> {
        self.rx.recv().unwrap_or(Err(JobError::Cancelled))
    }

    /// Blocks up to `timeout`, returning `None` if the job is still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<JobOutcome<R>> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => None,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Some(Err(JobError::Cancelled))
            }
        }
    }
}

/// Polls a set of outstanding handles, returning the first one that is
/// ready within `timeout`.
///
/// The ready handle is removed from `handles`; `None` on timeout so the
/// caller controls retry cadence. Never blocks indefinitely.
pub fn wait_any<R>(
    handles: &mut Vec<JobHandle<R>>,
    timeout: Duration,
) -> Option<(Uuid, JobOutcome<R>)> {
    let deadline = Instant::now() + timeout;
    loop {
        for idx in 0..handles.len() {
            if let Some(outcome) = handles[idx].try_outcome() {
                let handle = handles.swap_remove(idx);
                return Some((handle.id, outcome));
            }
        }
        if handles.is_empty() || Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
    }
}

/// A queued unit of work, ready for a worker to execute.
///
/// `run` executes the user closure with panic isolation and resolves the
/// handle. `cancel` resolves the handle with [`JobError::Cancelled`] without
/// executing anything; the pool invokes it for jobs drained on shutdown.
pub(crate) struct QueuedJob {
    pub(crate) id: Uuid,
    pub(crate) run: Box<dyn FnOnce() + Send>,
    pub(crate) cancel: Box<dyn FnOnce() + Send>,
}

impl QueuedJob {
    /// Wraps a user closure, returning the queue entry and its handle.
    pub(crate) fn new<R, F>(f: F) -> (Self, JobHandle<R>)
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let id = Uuid::new_v4();
        let (tx, rx): (Sender<JobOutcome<R>>, _) = bounded(1);
        let cancel_tx = tx.clone();

        let run = Box::new(move || {
            let outcome = match catch_unwind(AssertUnwindSafe(f)) {
                Ok(value) => Ok(value),
                Err(payload) => Err(JobError::Panicked(panic_message(payload.as_ref()))),
            };
            // The receiver may already be gone; the job still ran.
            let _ = tx.send(outcome);
        });
        let cancel = Box::new(move || {
            let _ = cancel_tx.send(Err(JobError::Cancelled));
        });

        (Self { id, run, cancel }, JobHandle { id, rx })
    }
}

/// Extracts a printable message from a panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_resolves_handle_with_value() {
        let (job, handle) = QueuedJob::new(|| 40 + 2);
        assert!(handle.try_outcome().is_none());

        (job.run)();
        assert_eq!(handle.wait(), Ok(42));
    }

    #[test]
    fn test_panicking_job_resolves_as_errored() {
        let (job, handle) = QueuedJob::new(|| -> u32 { panic!("boom") });
        (job.run)();

        match handle.wait() {
            Err(JobError::Panicked(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected Panicked, got {:?}", other),
        }
    }

    #[test]
    fn test_cancel_resolves_without_executing() {
        let (job, handle) = QueuedJob::new(|| 1);
        (job.cancel)();
        assert_eq!(handle.wait(), Err(JobError::Cancelled));
    }

    #[test]
    fn test_wait_timeout_returns_none_while_pending() {
        let (_job, handle) = QueuedJob::new(|| 1);
        assert!(handle.wait_timeout(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn test_wait_any_returns_first_ready_handle() {
        let (job_a, handle_a) = QueuedJob::new(|| "a");
        let (_job_b, handle_b) = QueuedJob::new(|| "b");
        let a_id = handle_a.id();

        let mut handles = vec![handle_a, handle_b];
        (job_a.run)();

        let (id, outcome) =
            wait_any(&mut handles, Duration::from_millis(100)).expect("a should be ready");
        assert_eq!(id, a_id);
        assert_eq!(outcome, Ok("a"));
        assert_eq!(handles.len(), 1);
    }

    #[test]
    fn test_wait_any_times_out_with_nothing_ready() {
        let (_job, handle) = QueuedJob::new(|| 1);
        let mut handles = vec![handle];

        let start = Instant::now();
        assert!(wait_any(&mut handles, Duration::from_millis(30)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(handles.len(), 1);
    }
}
