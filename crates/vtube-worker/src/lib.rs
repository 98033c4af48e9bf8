//! Video publish worker.
//!
//! This crate provides:
//! - The publish processor (concurrent uploads, record transition, compensation)
//! - A semaphore-bounded job executor over the Redis queue
//! - Delayed-retry promotion and crash recovery of pending jobs
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod processor;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use processor::{cleanup_local_files, ProcessOutcome, PublishProcessor};
