//! Record store abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use vtube_models::{VideoId, VideoRecord, VideoUpdate};

use crate::error::FirestoreResult;

/// Persistent storage for video records.
#[automock]
#[async_trait]
pub trait VideoStore: Send + Sync {
    /// Persist a new record. Fails with `AlreadyExists` if the ID is taken.
    async fn create(&self, record: &VideoRecord) -> FirestoreResult<VideoRecord>;

    async fn get(&self, id: &VideoId) -> FirestoreResult<Option<VideoRecord>>;

    /// Apply an update as one atomic write and return the updated record.
    ///
    /// Fails with `NotFound` instead of creating a missing record.
    async fn update_by_id(&self, id: &VideoId, update: &VideoUpdate) -> FirestoreResult<VideoRecord>;

    /// Mark the record failed only if it is still `processing`.
    ///
    /// Returns whether the transition happened.
    async fn fail_if_processing(&self, id: &VideoId) -> FirestoreResult<bool>;

    /// Records still `processing` that were created before `cutoff`, oldest first.
    async fn list_processing_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> FirestoreResult<Vec<VideoRecord>>;

    async fn health_check(&self) -> FirestoreResult<()>;
}
