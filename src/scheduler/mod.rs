//! Concurrent job scheduler for long-running simulation jobs.
//!
//! This module provides in-process infrastructure for parallel replica
//! execution:
//!
//! - **JobQueue**: shared FIFO with condvar-blocked workers and front
//!   insertion for shrink sentinels
//! - **WorkerPool**: bounded set of OS worker threads with runtime resize
//!   and graceful teardown
//! - **JobHandle**: future-style per-job result retrieval with `wait_any`
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │  Orchestrator│
//!                      │   (submit)   │
//!                      └──────┬───────┘
//!                             │
//!                      ┌──────▼───────┐
//!                      │  JobQueue    │
//!                      │ (FIFO, lock) │
//!                      └──────┬───────┘
//!                             │
//!         ┌───────────────────┼───────────────────┐
//!         │                   │                   │
//!         ▼                   ▼                   ▼
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │ Worker 0│         │ Worker 1│         │ Worker N│
//!    └─────────┘         └─────────┘         └─────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use mrsweep::scheduler::{wait_any, WorkerPool};
//! use std::time::Duration;
//!
//! let mut pool = WorkerPool::new(2).expect("at least one worker");
//! let mut handles = vec![
//!     pool.submit(|| 1 + 1).expect("queue open"),
//!     pool.submit(|| 2 + 2).expect("queue open"),
//! ];
//! pool.start().expect("first start");
//!
//! while !handles.is_empty() {
//!     if let Some((id, outcome)) = wait_any(&mut handles, Duration::from_secs(1)) {
//!         println!("{id}: {:?}", outcome);
//!     }
//! }
//! pool.shutdown();
//! ```

pub mod job;
pub mod queue;
pub mod worker_pool;

// Re-export main types for convenience
pub use job::{wait_any, JobError, JobHandle, JobOutcome};
pub use queue::QueueError;
pub use worker_pool::{PoolError, PoolState, WorkerPool};
