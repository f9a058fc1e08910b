//! In-process FIFO job queue shared by all workers.
//!
//! One coarse mutex protects the deque; it is held only around
//! enqueue/dequeue bookkeeping, never during job execution. Workers block on
//! a condition variable while the queue is empty, so there is no busy-wait;
//! `close_and_drain` wakes every waiter for teardown and shrink sentinels
//! are inserted at the front so an idle worker picks them up next.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crossbeam_channel::Sender;
use thiserror::Error;

use super::job::QueuedJob;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue no longer accepts jobs; pool teardown has begun.
    #[error("job queue is closed")]
    Closed,
}

/// One entry in the queue: a real job or a shrink control item.
///
/// A sentinel makes the worker that dequeues it report its own logical id
/// on the channel and exit its loop; which worker that is does not matter,
/// any worker is an equally valid removal candidate.
pub(crate) enum QueueItem {
    Task(QueuedJob),
    Sentinel(Sender<usize>),
}

#[derive(Default)]
struct QueueInner {
    items: VecDeque<QueueItem>,
    closed: bool,
}

/// FIFO queue with mutually exclusive access and front insertion for
/// control items.
pub(crate) struct JobQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            available: Condvar::new(),
        }
    }

    /// Appends a job in FIFO position.
    pub(crate) fn push_back(&self, item: QueueItem) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        if inner.closed {
            return Err(QueueError::Closed);
        }
        inner.items.push_back(item);
        drop(inner);
        self.available.notify_one();
        Ok(())
    }

    /// Inserts a control item ahead of all pending jobs.
    pub(crate) fn push_front(&self, item: QueueItem) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        if inner.closed {
            return Err(QueueError::Closed);
        }
        inner.items.push_front(item);
        drop(inner);
        self.available.notify_one();
        Ok(())
    }

    /// Blocks until an item is available or the queue is closed.
    ///
    /// Returns `None` once the queue is closed; remaining items after a
    /// close belong to whoever closed the queue (see `close_and_drain`).
    pub(crate) fn pop_blocking(&self) -> Option<QueueItem> {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        loop {
            if inner.closed {
                return None;
            }
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            inner = self
                .available
                .wait(inner)
                .expect("queue mutex poisoned");
        }
    }

    /// Advisory queue depth; never used for synchronization.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().expect("queue mutex poisoned").items.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.lock().expect("queue mutex poisoned").closed
    }

    /// Atomically closes the queue, removes every pending item, and wakes
    /// all blocked workers so they observe the close.
    pub(crate) fn close_and_drain(&self) -> Vec<QueueItem> {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        inner.closed = true;
        let drained = inner.items.drain(..).collect();
        drop(inner);
        self.available.notify_all();
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::QueuedJob;
    use std::sync::Arc;
    use std::time::Duration;

    fn task(marker: u32) -> (QueueItem, crate::scheduler::job::JobHandle<u32>) {
        let (job, handle) = QueuedJob::new(move || marker);
        (QueueItem::Task(job), handle)
    }

    #[test]
    fn test_fifo_order() {
        let queue = JobQueue::new();
        let (a, ha) = task(1);
        let (b, hb) = task(2);
        queue.push_back(a).expect("open queue");
        queue.push_back(b).expect("open queue");

        for expected in [1, 2] {
            match queue.pop_blocking().expect("item present") {
                QueueItem::Task(job) => (job.run)(),
                QueueItem::Sentinel(_) => panic!("unexpected sentinel"),
            }
            let handle = if expected == 1 { &ha } else { &hb };
            assert_eq!(handle.try_outcome(), Some(Ok(expected)));
        }
    }

    #[test]
    fn test_push_front_jumps_the_queue() {
        let queue = JobQueue::new();
        let (a, _ha) = task(1);
        queue.push_back(a).expect("open queue");

        let (tx, rx) = crossbeam_channel::bounded(1);
        queue.push_front(QueueItem::Sentinel(tx)).expect("open queue");

        match queue.pop_blocking().expect("item present") {
            QueueItem::Sentinel(sender) => sender.send(7).expect("receiver alive"),
            QueueItem::Task(_) => panic!("sentinel should come first"),
        }
        assert_eq!(rx.recv(), Ok(7));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_close_rejects_new_jobs_and_drains() {
        let queue = JobQueue::new();
        let (a, _ha) = task(1);
        queue.push_back(a).expect("open queue");

        let drained = queue.close_and_drain();
        assert_eq!(drained.len(), 1);
        assert!(queue.is_closed());

        let (b, _hb) = task(2);
        assert!(matches!(queue.push_back(b), Err(QueueError::Closed)));
        assert!(queue.pop_blocking().is_none());
    }

    #[test]
    fn test_close_wakes_blocked_consumer() {
        let queue = Arc::new(JobQueue::new());
        let consumer_queue = Arc::clone(&queue);
        let consumer = std::thread::spawn(move || consumer_queue.pop_blocking().is_none());

        // Give the consumer time to block on the condvar.
        std::thread::sleep(Duration::from_millis(50));
        queue.close_and_drain();

        assert!(consumer.join().expect("consumer should not panic"));
    }
}
