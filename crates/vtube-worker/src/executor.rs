//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use vtube_queue::{FailureDisposition, JobQueue, ProcessVideoJob, QueueJob, QueuedJob};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::processor::{cleanup_local_files, PublishProcessor};

/// Upper bound on jobs read from the stream in one call.
const MAX_BATCH: usize = 5;

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    processor: Arc<PublishProcessor>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: JobQueue, processor: PublishProcessor) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.concurrency));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            processor: Arc::new(processor),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Run until [`shutdown`](Self::shutdown) is called, then drain in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} concurrent jobs",
            self.consumer_name, self.config.concurrency
        );

        self.queue.init().await?;

        let promote_task = self.spawn_promoter();
        let claim_task = self.spawn_claimer();

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        promote_task.abort();
        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}; they will be re-delivered",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Periodically move due retries from the delayed set back onto the stream.
    fn spawn_promoter(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let period = self.config.promote_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = queue.promote_due(100).await {
                    warn!("Failed to promote delayed jobs: {}", e);
                }
            }
        })
    }

    /// Periodically take over jobs left pending by consumers that died.
    fn spawn_claimer(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let processor = Arc::clone(&self.processor);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let period = self.config.claim_interval;
        let min_idle_ms = self.config.claim_min_idle.as_millis() as u64;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let available = semaphore.available_permits();
                if available == 0 {
                    continue;
                }

                match queue
                    .claim_pending(&consumer_name, min_idle_ms, available.min(MAX_BATCH))
                    .await
                {
                    Ok(jobs) if !jobs.is_empty() => {
                        info!("Claimed {} pending jobs", jobs.len());
                        for job in jobs {
                            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                return;
                            };
                            let queue = Arc::clone(&queue);
                            let processor = Arc::clone(&processor);
                            tokio::spawn(async move {
                                let _permit = permit;
                                Self::execute_job(processor, queue, job).await;
                            });
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Failed to claim pending jobs: {}", e),
                }
            }
        })
    }

    /// Consume and process jobs from the queue.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(
                &self.consumer_name,
                self.config.consume_block.as_millis() as u64,
                available.min(MAX_BATCH),
            )
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Consumed {} jobs from queue", jobs.len());

        for job in jobs {
            let processor = Arc::clone(&self.processor);
            let queue = Arc::clone(&self.queue);
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::config_error("job semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(processor, queue, job).await;
            });
        }

        Ok(())
    }

    /// Execute a single delivery and settle it with the queue.
    async fn execute_job(processor: Arc<PublishProcessor>, queue: Arc<JobQueue>, job: QueuedJob) {
        let QueueJob::ProcessVideo(payload) = &job.job;
        let logger = JobLogger::new(&payload.job_id, &payload.video_id, job.attempt);
        let span = logger.create_span();

        async {
            logger.log_start("processing video");

            match processor.process(payload, &logger).await {
                Ok(outcome) => {
                    metrics::record_job_completed(outcome.label());
                    if let Err(e) = queue.ack(&job).await {
                        // Still pending; another consumer will claim and skip it
                        logger.log_error(&format!("failed to ack job: {}", e));
                    }
                    cleanup_local_files(payload).await;
                }
                Err(e) => {
                    logger.log_error(&e.to_string());
                    metrics::record_job_failed(e.kind());

                    match queue.fail(&job, &e.to_string()).await {
                        Ok(disposition) => {
                            Self::settle_failure(&processor, payload, &e, &disposition, &logger)
                                .await;
                        }
                        Err(qe) => {
                            logger.log_error(&format!("failed to record job failure: {}", qe));
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Apply the queue's verdict on a failed delivery.
    ///
    /// Local files stay in place while a retry is pending. Once the queue
    /// gives up the record is left `failed` and the files are removed.
    async fn settle_failure(
        processor: &PublishProcessor,
        payload: &ProcessVideoJob,
        error: &WorkerError,
        disposition: &FailureDisposition,
        logger: &JobLogger,
    ) {
        if !disposition.is_terminal() {
            metrics::record_job_retried();
            logger.log_warning(&format!("retry scheduled: {:?}", disposition));
            return;
        }

        metrics::record_job_dead_lettered();
        logger.log_error(&format!("job gave up: {:?}", disposition));
        // Upload failures already marked the record
        if !matches!(error, WorkerError::Upload(_)) {
            processor.mark_failed(&payload.video_id, logger).await;
        }
        cleanup_local_files(payload).await;
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.concurrency {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;
    use vtube_firestore::{MemoryVideoStore, VideoStore};
    use vtube_models::{VideoRecord, VideoStatus};
    use vtube_storage::{MediaGateway, StorageResult, UploadedMedia};

    struct UnusedGateway;

    #[async_trait]
    impl MediaGateway for UnusedGateway {
        async fn upload(&self, _local_path: &Path) -> StorageResult<UploadedMedia> {
            unreachable!("settling a failure never uploads")
        }

        async fn delete(&self, _public_id: &str) -> StorageResult<()> {
            unreachable!("settling a failure never deletes")
        }
    }

    struct Fixture {
        store: Arc<MemoryVideoStore>,
        processor: PublishProcessor,
        payload: ProcessVideoJob,
        files: [PathBuf; 2],
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("v.mp4");
        let thumbnail = dir.path().join("t.jpg");
        tokio::fs::write(&video, b"video").await.unwrap();
        tokio::fs::write(&thumbnail, b"image").await.unwrap();

        let store = Arc::new(MemoryVideoStore::new());
        let record = VideoRecord::placeholder("T", "D", "user-1");
        store.insert(record.clone()).await;

        let processor =
            PublishProcessor::new(store.clone(), Arc::new(UnusedGateway), Duration::from_secs(1));
        let payload = ProcessVideoJob::new(
            record.id.clone(),
            video.to_string_lossy(),
            thumbnail.to_string_lossy(),
        );

        Fixture {
            store,
            processor,
            payload,
            files: [video, thumbnail],
            _dir: dir,
        }
    }

    impl Fixture {
        async fn settle(&self, error: WorkerError, disposition: FailureDisposition) {
            let logger = JobLogger::new(&self.payload.job_id, &self.payload.video_id, 3);
            JobExecutor::settle_failure(
                &self.processor,
                &self.payload,
                &error,
                &disposition,
                &logger,
            )
            .await;
        }

        async fn status(&self) -> VideoStatus {
            self.store.get(&self.payload.video_id).await.unwrap().unwrap().status
        }

        fn files_exist(&self) -> bool {
            self.files.iter().all(|f| f.exists())
        }
    }

    #[tokio::test]
    async fn test_pending_retry_keeps_record_and_local_files() {
        let fx = fixture().await;
        fx.settle(
            WorkerError::storage_update("write timed out"),
            FailureDisposition::RetryScheduled {
                next_attempt: 2,
                delay: Duration::from_secs(5),
            },
        )
        .await;

        assert_eq!(fx.status().await, VideoStatus::Processing);
        assert!(fx.files_exist());
    }

    #[tokio::test]
    async fn test_exhausted_record_write_fails_record_and_removes_files() {
        let fx = fixture().await;
        fx.settle(
            WorkerError::storage_update("write timed out"),
            FailureDisposition::DeadLettered,
        )
        .await;

        let record = fx.store.get(&fx.payload.video_id).await.unwrap().unwrap();
        assert_eq!(record.status, VideoStatus::Failed);
        assert!(record.is_consistent());
        assert!(fx.files.iter().all(|f| !f.exists()));
    }

    #[tokio::test]
    async fn test_exhausted_upload_failure_only_removes_files() {
        let fx = fixture().await;
        fx.settle(WorkerError::upload("thumbnail rejected"), FailureDisposition::Discarded)
            .await;

        // The processor marks the record itself on upload failures
        assert_eq!(fx.status().await, VideoStatus::Processing);
        assert!(fx.files.iter().all(|f| !f.exists()));
    }
}
