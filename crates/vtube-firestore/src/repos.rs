//! Firestore-backed video repository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use vtube_models::{MediaAsset, VideoId, VideoRecord, VideoStatus, VideoUpdate};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::store::VideoStore;
use crate::types::{
    Document, Filter, FromFirestoreValue, MapValue, Precondition, StructuredQuery,
    ToFirestoreValue, Value,
};

/// Top-level collection holding video records.
pub const VIDEOS_COLLECTION: &str = "videos";

/// Every field a pipeline transition writes. Masked fields absent from the
/// payload are cleared, so `Failed` drops any media in the same write.
const TRANSITION_MASK: &[&str] = &[
    "status",
    "isPublished",
    "videoFile",
    "thumbnail",
    "duration",
    "updatedAt",
];

/// Repository for video documents.
#[derive(Clone)]
pub struct VideoRepository {
    client: FirestoreClient,
}

impl VideoRepository {
    /// Create a new video repository.
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        Ok(Self::new(FirestoreClient::from_env().await?))
    }
}

#[async_trait]
impl VideoStore for VideoRepository {
    async fn create(&self, record: &VideoRecord) -> FirestoreResult<VideoRecord> {
        let doc = self
            .client
            .create_document(VIDEOS_COLLECTION, record.id.as_str(), record_to_fields(record))
            .await?;
        info!(video_id = %record.id, "Created video record");
        document_to_record(&doc, &record.id)
    }

    async fn get(&self, id: &VideoId) -> FirestoreResult<Option<VideoRecord>> {
        match self.client.get_document(VIDEOS_COLLECTION, id.as_str()).await? {
            Some(doc) => Ok(Some(document_to_record(&doc, id)?)),
            None => Ok(None),
        }
    }

    async fn update_by_id(&self, id: &VideoId, update: &VideoUpdate) -> FirestoreResult<VideoRecord> {
        let doc = self
            .client
            .update_document(
                VIDEOS_COLLECTION,
                id.as_str(),
                update_to_fields(update, Utc::now()),
                TRANSITION_MASK,
                Some(Precondition::Exists),
            )
            .await?;
        info!(video_id = %id, status = %update.status(), "Updated video record");
        document_to_record(&doc, id)
    }

    async fn fail_if_processing(&self, id: &VideoId) -> FirestoreResult<bool> {
        let Some(doc) = self.client.get_document(VIDEOS_COLLECTION, id.as_str()).await? else {
            return Ok(false);
        };
        if document_to_record(&doc, id)?.status != VideoStatus::Processing {
            return Ok(false);
        }

        // Guard on the version we read so a concurrent publish wins
        let precondition = doc
            .update_time
            .clone()
            .map(Precondition::UpdateTime)
            .unwrap_or(Precondition::Exists);

        let result = self
            .client
            .update_document(
                VIDEOS_COLLECTION,
                id.as_str(),
                update_to_fields(&VideoUpdate::Failed, Utc::now()),
                TRANSITION_MASK,
                Some(precondition),
            )
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if e.is_precondition_failed() || e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_processing_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> FirestoreResult<Vec<VideoRecord>> {
        let query = StructuredQuery::collection(VIDEOS_COLLECTION)
            .filter_all(vec![
                Filter::field("status", "EQUAL", VideoStatus::Processing.as_str().to_firestore_value()),
                Filter::field("createdAt", "LESS_THAN", cutoff.to_firestore_value()),
            ])
            .order_by("createdAt", "ASCENDING")
            .limit(limit.min(i32::MAX as usize) as i32);

        let docs = self.client.run_query(query).await?;

        let mut records = Vec::with_capacity(docs.len());
        for doc in docs {
            let Some(id) = doc.id().map(VideoId::from) else {
                continue;
            };
            match document_to_record(&doc, &id) {
                Ok(record) => records.push(record),
                Err(e) => warn!(video_id = %id, "Skipping malformed video document: {}", e),
            }
        }
        Ok(records)
    }

    async fn health_check(&self) -> FirestoreResult<()> {
        self.client
            .run_query(StructuredQuery::collection(VIDEOS_COLLECTION).limit(1))
            .await?;
        Ok(())
    }
}

// =============================================================================
// Document mapping
// =============================================================================

fn media_to_value(asset: &MediaAsset) -> Value {
    let mut fields = HashMap::new();
    fields.insert("url".to_string(), asset.url.to_firestore_value());
    fields.insert("publicId".to_string(), asset.public_id.to_firestore_value());
    Value::MapValue(MapValue {
        fields: Some(fields),
    })
}

fn media_from_value(value: &Value) -> Option<MediaAsset> {
    let fields = HashMap::<String, Value>::from_firestore_value(value)?;
    Some(MediaAsset {
        url: fields.get("url").and_then(String::from_firestore_value)?,
        public_id: fields.get("publicId").and_then(String::from_firestore_value)?,
    })
}

fn record_to_fields(record: &VideoRecord) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("title".to_string(), record.title.to_firestore_value());
    fields.insert("description".to_string(), record.description.to_firestore_value());
    fields.insert("owner".to_string(), record.owner_id.to_firestore_value());
    fields.insert("status".to_string(), record.status.as_str().to_firestore_value());
    fields.insert("isPublished".to_string(), record.is_published.to_firestore_value());
    if let Some(v) = &record.video_file {
        fields.insert("videoFile".to_string(), media_to_value(v));
    }
    if let Some(t) = &record.thumbnail {
        fields.insert("thumbnail".to_string(), media_to_value(t));
    }
    if let Some(d) = record.duration {
        fields.insert("duration".to_string(), d.to_firestore_value());
    }
    fields.insert("createdAt".to_string(), record.created_at.to_firestore_value());
    fields.insert("updatedAt".to_string(), record.updated_at.to_firestore_value());
    fields
}

fn update_to_fields(update: &VideoUpdate, now: DateTime<Utc>) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("status".to_string(), update.status().as_str().to_firestore_value());
    fields.insert("updatedAt".to_string(), now.to_firestore_value());

    match update {
        VideoUpdate::Published {
            video_file,
            thumbnail,
            duration,
        } => {
            fields.insert("isPublished".to_string(), true.to_firestore_value());
            fields.insert("videoFile".to_string(), media_to_value(video_file));
            fields.insert("thumbnail".to_string(), media_to_value(thumbnail));
            if let Some(d) = duration {
                fields.insert("duration".to_string(), d.to_firestore_value());
            }
        }
        VideoUpdate::Failed => {
            fields.insert("isPublished".to_string(), false.to_firestore_value());
        }
    }
    fields
}

fn document_to_record(doc: &Document, id: &VideoId) -> FirestoreResult<VideoRecord> {
    let required_string = |name: &str| {
        doc.field(name)
            .and_then(String::from_firestore_value)
            .ok_or_else(|| {
                FirestoreError::invalid_response(format!("video {} missing field {}", id, name))
            })
    };
    let timestamp = |name: &str| doc.field(name).and_then(DateTime::<Utc>::from_firestore_value);

    let status = required_string("status")?
        .parse::<VideoStatus>()
        .map_err(|e| FirestoreError::invalid_response(e.to_string()))?;
    let created_at = timestamp("createdAt").unwrap_or_else(Utc::now);

    Ok(VideoRecord {
        id: id.clone(),
        title: required_string("title")?,
        description: required_string("description")?,
        owner_id: required_string("owner")?,
        status,
        video_file: doc.field("videoFile").and_then(media_from_value),
        thumbnail: doc.field("thumbnail").and_then(media_from_value),
        duration: doc.field("duration").and_then(f64::from_firestore_value),
        is_published: doc
            .field("isPublished")
            .and_then(bool::from_firestore_value)
            .unwrap_or(false),
        created_at,
        updated_at: timestamp("updatedAt").unwrap_or(created_at),
    })
}
