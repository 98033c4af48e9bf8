//! In-process video store for tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use vtube_models::{VideoId, VideoRecord, VideoStatus, VideoUpdate};

use crate::error::{FirestoreError, FirestoreResult};
use crate::store::VideoStore;

/// [`VideoStore`] kept in memory. Every operation holds the lock for its
/// whole read-modify-write, so updates are atomic like the remote store.
#[derive(Default)]
pub struct MemoryVideoStore {
    records: RwLock<HashMap<VideoId, VideoRecord>>,
}

impl MemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Overwrite a record directly, bypassing pipeline transitions.
    pub async fn insert(&self, record: VideoRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }
}

#[async_trait]
impl VideoStore for MemoryVideoStore {
    async fn create(&self, record: &VideoRecord) -> FirestoreResult<VideoRecord> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(FirestoreError::AlreadyExists(format!("videos/{}", record.id)));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(record.clone())
    }

    async fn get(&self, id: &VideoId) -> FirestoreResult<Option<VideoRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update_by_id(&self, id: &VideoId, update: &VideoUpdate) -> FirestoreResult<VideoRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| FirestoreError::not_found(format!("videos/{}", id)))?;
        update.apply_to(record);
        Ok(record.clone())
    }

    async fn fail_if_processing(&self, id: &VideoId) -> FirestoreResult<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(id) {
            Some(record) if record.status == VideoStatus::Processing => {
                VideoUpdate::Failed.apply_to(record);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_processing_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> FirestoreResult<Vec<VideoRecord>> {
        let records = self.records.read().await;
        let mut stale: Vec<VideoRecord> = records
            .values()
            .filter(|r| r.status == VideoStatus::Processing && r.created_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.created_at);
        stale.truncate(limit);
        Ok(stale)
    }

    async fn health_check(&self) -> FirestoreResult<()> {
        Ok(())
    }
}
