//! Publish intake: validate, create the placeholder record, enqueue the job.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use vtube_firestore::{FirestoreError, VideoStore};
use vtube_models::VideoRecord;
use vtube_queue::{JobPublisher, ProcessVideoJob};

use crate::security::{sanitize_text, MAX_DESCRIPTION_LENGTH, MAX_TITLE_LENGTH};

/// Everything a publish call needs, as received.
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub video_file_local_path: Option<String>,
    pub thumbnail_local_path: Option<String>,
    /// Authenticated caller, if any
    pub owner_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    /// The job could not be enqueued; the placeholder has been marked failed.
    #[error("Could not queue video for processing: {0}")]
    QueueUnavailable(String),

    #[error("Could not create video record: {0}")]
    Store(#[from] FirestoreError),
}

/// Accepts publish requests and hands them to the worker pool.
pub struct PublishIntake {
    store: Arc<dyn VideoStore>,
    publisher: Arc<dyn JobPublisher>,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, IntakeError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing(name))
}

/// Sanitized text field; blank once sanitized counts as missing.
fn required_text(
    value: &Option<String>,
    name: &str,
    max_len: usize,
) -> Result<String, IntakeError> {
    value
        .as_deref()
        .map(|v| sanitize_text(v, max_len))
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing(name))
}

fn missing(name: &str) -> IntakeError {
    IntakeError::Validation(format!("{} is required.", name))
}

impl PublishIntake {
    pub fn new(store: Arc<dyn VideoStore>, publisher: Arc<dyn JobPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Create a `processing` record and enqueue its job.
    ///
    /// Returns as soon as the job is queued. No record is created when
    /// validation fails, and no job is enqueued when record creation fails.
    pub async fn publish(&self, request: PublishRequest) -> Result<VideoRecord, IntakeError> {
        let title = required_text(&request.title, "title", MAX_TITLE_LENGTH)?;
        let description =
            required_text(&request.description, "description", MAX_DESCRIPTION_LENGTH)?;
        let video_path = required(&request.video_file_local_path, "videoFile")?;
        let thumbnail_path = required(&request.thumbnail_local_path, "thumbnail")?;
        let owner_id = request
            .owner_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                IntakeError::Unauthorized("You must be logged in to publish a video.".to_string())
            })?;

        let placeholder = VideoRecord::placeholder(title, description, owner_id);
        let record = self.store.create(&placeholder).await?;

        let job = ProcessVideoJob::new(record.id.clone(), video_path, thumbnail_path);
        let job_id = job.job_id.clone();

        match self.publisher.publish(job).await {
            Ok(handle) => {
                info!(
                    video_id = %record.id,
                    job_id = %job_id,
                    handle = %handle,
                    "Video queued for processing"
                );
                Ok(record)
            }
            Err(e) => {
                error!(video_id = %record.id, "Failed to enqueue video job: {}", e);
                // Don't leave a record nobody will ever process
                if let Err(mark_err) = self.store.fail_if_processing(&record.id).await {
                    warn!(
                        video_id = %record.id,
                        "Could not mark unqueued video failed: {}", mark_err
                    );
                }
                Err(IntakeError::QueueUnavailable(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtube_firestore::{MemoryVideoStore, MockVideoStore};
    use vtube_models::VideoStatus;
    use vtube_queue::{MockJobPublisher, QueueError};

    fn request() -> PublishRequest {
        PublishRequest {
            title: Some("T".to_string()),
            description: Some("D".to_string()),
            video_file_local_path: Some("/tmp/v.mp4".to_string()),
            thumbnail_local_path: Some("/tmp/t.jpg".to_string()),
            owner_id: Some("user-1".to_string()),
        }
    }

    fn accepting_publisher() -> MockJobPublisher {
        let mut publisher = MockJobPublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|_| Ok("1-0".to_string()));
        publisher
    }

    fn rejecting_publisher() -> MockJobPublisher {
        let mut publisher = MockJobPublisher::new();
        publisher.expect_publish().never();
        publisher
    }

    #[tokio::test]
    async fn test_publish_creates_processing_record_and_one_job() {
        let store = Arc::new(MemoryVideoStore::new());
        let mut publisher = MockJobPublisher::new();
        publisher
            .expect_publish()
            .withf(|job| {
                job.video_file_local_path == "/tmp/v.mp4" && job.thumbnail_local_path == "/tmp/t.jpg"
            })
            .times(1)
            .returning(|_| Ok("1-0".to_string()));

        let intake = PublishIntake::new(store.clone(), Arc::new(publisher));
        let record = intake.publish(request()).await.unwrap();

        assert_eq!(record.status, VideoStatus::Processing);
        assert!(!record.is_published);
        assert!(record.video_file.is_none());
        assert_eq!(record.owner_id, "user-1");
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_job_references_created_record() {
        let store = Arc::new(MemoryVideoStore::new());
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_in_mock = Arc::clone(&seen);

        let mut publisher = MockJobPublisher::new();
        publisher.expect_publish().times(1).returning(move |job| {
            *seen_in_mock.lock().unwrap() = Some(job.video_id.clone());
            Ok("1-0".to_string())
        });

        let intake = PublishIntake::new(store, Arc::new(publisher));
        let record = intake.publish(request()).await.unwrap();

        assert_eq!(seen.lock().unwrap().clone(), Some(record.id));
    }

    #[tokio::test]
    async fn test_missing_title_has_no_side_effects() {
        let store = Arc::new(MemoryVideoStore::new());
        let intake = PublishIntake::new(store.clone(), Arc::new(rejecting_publisher()));

        let err = intake
            .publish(PublishRequest {
                title: None,
                ..request()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, IntakeError::Validation(ref m) if m == "title is required."));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_blank_description_rejected() {
        let store = Arc::new(MemoryVideoStore::new());
        let intake = PublishIntake::new(store.clone(), Arc::new(rejecting_publisher()));

        let err = intake
            .publish(PublishRequest {
                description: Some("   ".to_string()),
                ..request()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, IntakeError::Validation(ref m) if m.starts_with("description")));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_files_rejected_in_order() {
        let store = Arc::new(MemoryVideoStore::new());
        let intake = PublishIntake::new(store.clone(), Arc::new(rejecting_publisher()));

        let err = intake
            .publish(PublishRequest {
                video_file_local_path: None,
                thumbnail_local_path: None,
                ..request()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Validation(ref m) if m.starts_with("videoFile")));

        let err = intake
            .publish(PublishRequest {
                thumbnail_local_path: None,
                ..request()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Validation(ref m) if m.starts_with("thumbnail")));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_anonymous_caller_unauthorized() {
        let store = Arc::new(MemoryVideoStore::new());
        let intake = PublishIntake::new(store.clone(), Arc::new(rejecting_publisher()));

        let err = intake
            .publish(PublishRequest {
                owner_id: None,
                ..request()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, IntakeError::Unauthorized(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_queue_failure_marks_placeholder_failed() {
        let store = Arc::new(MemoryVideoStore::new());
        let mut publisher = MockJobPublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|_| Err(QueueError::Unavailable("connection refused".to_string())));

        let intake = PublishIntake::new(store.clone(), Arc::new(publisher));
        let err = intake.publish(request()).await.unwrap_err();

        assert!(matches!(err, IntakeError::QueueUnavailable(_)));
        let stale = store
            .list_processing_before(chrono::Utc::now() + chrono::Duration::hours(1), 10)
            .await
            .unwrap();
        assert!(stale.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_store_failure_enqueues_nothing() {
        let mut store = MockVideoStore::new();
        store
            .expect_create()
            .times(1)
            .returning(|_| Err(FirestoreError::ServerError(500, "unavailable".into())));

        let intake = PublishIntake::new(Arc::new(store), Arc::new(rejecting_publisher()));
        let err = intake.publish(request()).await.unwrap_err();

        assert!(matches!(err, IntakeError::Store(_)));
    }

    #[tokio::test]
    async fn test_title_is_trimmed() {
        let store = Arc::new(MemoryVideoStore::new());
        let intake = PublishIntake::new(store, Arc::new(accepting_publisher()));

        let record = intake
            .publish(PublishRequest {
                title: Some("  Launch day  ".to_string()),
                ..request()
            })
            .await
            .unwrap();

        assert_eq!(record.title, "Launch day");
    }

    #[tokio::test]
    async fn test_title_of_control_characters_is_missing() {
        let store = Arc::new(MemoryVideoStore::new());
        let intake = PublishIntake::new(store.clone(), Arc::new(rejecting_publisher()));

        let err = intake
            .publish(PublishRequest {
                title: Some("\u{7}  \u{7}".to_string()),
                ..request()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Validation(ref m) if m == "title is required."));

        let err = intake
            .publish(PublishRequest {
                description: Some("\u{1}".to_string()),
                ..request()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Validation(ref m) if m == "description is required."));
        assert!(store.is_empty().await);
    }
}
