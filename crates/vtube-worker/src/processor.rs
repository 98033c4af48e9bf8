//! Publish processing for a single job.
//!
//! Uploads the video file and thumbnail concurrently, then moves the record
//! to its terminal state in one write. When either upload fails the sibling
//! that did succeed is deleted again before the record is marked failed.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use vtube_firestore::VideoStore;
use vtube_models::{MediaAsset, VideoId, VideoRecord, VideoStatus, VideoUpdate};
use vtube_queue::ProcessVideoJob;
use vtube_storage::{MediaGateway, UploadedMedia};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// How a job that should be acknowledged ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Both uploads landed and the record is published.
    Published(VideoRecord),
    /// A previous delivery already published the record.
    AlreadyPublished,
    /// The record was deleted; nothing is left to publish.
    RecordMissing,
}

impl ProcessOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProcessOutcome::Published(_) => "published",
            ProcessOutcome::AlreadyPublished => "already_published",
            ProcessOutcome::RecordMissing => "record_missing",
        }
    }
}

/// Runs the publish pipeline for one job.
pub struct PublishProcessor {
    store: Arc<dyn VideoStore>,
    media: Arc<dyn MediaGateway>,
    upload_timeout: Duration,
}

impl PublishProcessor {
    pub fn new(
        store: Arc<dyn VideoStore>,
        media: Arc<dyn MediaGateway>,
        upload_timeout: Duration,
    ) -> Self {
        Self {
            store,
            media,
            upload_timeout,
        }
    }

    /// Process one delivery of a job.
    ///
    /// `Ok` means the job should be acknowledged. `Err` means the queue's
    /// retry policy applies; the record is already `failed` for
    /// [`WorkerError::Upload`] and untouched for [`WorkerError::StorageUpdate`].
    pub async fn process(
        &self,
        job: &ProcessVideoJob,
        logger: &JobLogger,
    ) -> WorkerResult<ProcessOutcome> {
        match self.store.get(&job.video_id).await? {
            None => {
                logger.log_warning("video record no longer exists, skipping");
                return Ok(ProcessOutcome::RecordMissing);
            }
            Some(record) if record.status == VideoStatus::Published => {
                logger.log_progress("video already published, skipping");
                return Ok(ProcessOutcome::AlreadyPublished);
            }
            Some(_) => {}
        }

        logger.log_progress("uploading video file and thumbnail");
        let started = Instant::now();
        let (video, thumbnail) = tokio::join!(
            self.upload(Path::new(&job.video_file_local_path)),
            self.upload(Path::new(&job.thumbnail_local_path)),
        );
        metrics::record_upload_duration(
            started.elapsed().as_secs_f64(),
            video.is_ok() && thumbnail.is_ok(),
        );

        match (video, thumbnail) {
            (Ok(video), Ok(thumbnail)) => {
                self.publish(&job.video_id, video, thumbnail, logger).await
            }
            (video, thumbnail) => {
                let mut reasons = Vec::new();
                for (label, result) in [("video file", video), ("thumbnail", thumbnail)] {
                    match result {
                        Ok(uploaded) => self.delete_orphan(&uploaded, logger).await,
                        Err(e) => reasons.push(format!("{}: {}", label, e)),
                    }
                }
                self.mark_failed(&job.video_id, logger).await;
                Err(WorkerError::upload(reasons.join("; ")))
            }
        }
    }

    async fn upload(&self, path: &Path) -> WorkerResult<UploadedMedia> {
        match tokio::time::timeout(self.upload_timeout, self.media.upload(path)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(WorkerError::upload(format!(
                "timed out after {}s",
                self.upload_timeout.as_secs_f64()
            ))),
        }
    }

    async fn publish(
        &self,
        video_id: &VideoId,
        video: UploadedMedia,
        thumbnail: UploadedMedia,
        logger: &JobLogger,
    ) -> WorkerResult<ProcessOutcome> {
        let update = VideoUpdate::Published {
            video_file: MediaAsset::new(video.url.clone(), video.public_id.clone()),
            thumbnail: MediaAsset::new(thumbnail.url.clone(), thumbnail.public_id.clone()),
            duration: video.duration,
        };

        match self.store.update_by_id(video_id, &update).await {
            Ok(record) => {
                logger.log_completion("video published");
                Ok(ProcessOutcome::Published(record))
            }
            Err(e) if e.is_not_found() => {
                logger.log_warning("video record deleted during upload, removing uploads");
                self.delete_orphan(&video, logger).await;
                self.delete_orphan(&thumbnail, logger).await;
                Ok(ProcessOutcome::RecordMissing)
            }
            // Uploads stay: the write may have landed even though we saw an error
            Err(e) => Err(WorkerError::storage_update(e.to_string())),
        }
    }

    /// Best-effort delete; failures only leave unreferenced storage behind.
    async fn delete_orphan(&self, uploaded: &UploadedMedia, logger: &JobLogger) {
        let delete = self.media.delete(&uploaded.public_id);
        let result = tokio::time::timeout(self.upload_timeout, delete)
            .await
            .map_err(|_| "timed out".to_string())
            .and_then(|r| r.map_err(|e| e.to_string()));

        match result {
            Ok(()) => {
                metrics::record_compensating_delete(true);
                debug!(public_id = %uploaded.public_id, "Deleted orphaned upload");
            }
            Err(e) => {
                metrics::record_compensating_delete(false);
                logger.log_warning(&format!(
                    "could not delete orphaned upload {}: {}",
                    uploaded.public_id, e
                ));
            }
        }
    }

    /// Move the record to `failed` unless it already reached a terminal state.
    pub(crate) async fn mark_failed(&self, video_id: &VideoId, logger: &JobLogger) {
        match self.store.fail_if_processing(video_id).await {
            Ok(true) => logger.log_progress("video marked failed"),
            Ok(false) => debug!(video_id = %video_id, "Record not processing, left as is"),
            Err(e) => logger.log_error(&format!("could not mark video failed: {}", e)),
        }
    }
}

/// Remove the job's local files. Missing files are ignored.
pub async fn cleanup_local_files(job: &ProcessVideoJob) {
    for path in [&job.video_file_local_path, &job.thumbnail_local_path] {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Removed local file {}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove local file {}: {}", path, e),
        }
    }
}
