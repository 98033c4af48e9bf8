//! Producer-side seam used by the publish intake.

use async_trait::async_trait;
use mockall::automock;

use crate::error::QueueResult;
use crate::job::{ProcessVideoJob, QueueJob};
use crate::queue::JobQueue;

/// Something that can hand a job to the processing workers.
#[automock]
#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Enqueue a job and return its queue handle.
    async fn publish(&self, job: ProcessVideoJob) -> QueueResult<String>;
}

#[async_trait]
impl JobPublisher for JobQueue {
    async fn publish(&self, job: ProcessVideoJob) -> QueueResult<String> {
        self.enqueue(QueueJob::ProcessVideo(job)).await
    }
}
