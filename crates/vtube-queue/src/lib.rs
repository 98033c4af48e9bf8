//! Redis Streams job queue.
//!
//! This crate provides:
//! - Job enqueueing via Redis Streams with duplicate suppression
//! - Consumer-group delivery with crash recovery (at-least-once)
//! - Exponential back-off retries through a delayed sorted set
//! - A dead-letter stream retaining jobs that exhausted their attempts

pub mod error;
pub mod job;
pub mod policy;
pub mod publisher;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{ProcessVideoJob, QueueJob, QueuedJob, PROCESS_VIDEO_JOB};
pub use policy::{Backoff, RetryPolicy};
pub use publisher::{JobPublisher, MockJobPublisher};
pub use queue::{FailureDisposition, JobQueue, QueueConfig};
