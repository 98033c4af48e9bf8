//! Job types for the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vtube_models::{JobId, VideoId};

/// Wire name of the video publish job.
pub const PROCESS_VIDEO_JOB: &str = "processVideo";

/// Job to upload the media of a freshly created video record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessVideoJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Record the uploads belong to
    pub video_id: VideoId,
    /// Local path of the uploaded video file
    pub video_file_local_path: String,
    /// Local path of the uploaded thumbnail
    pub thumbnail_local_path: String,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl ProcessVideoJob {
    pub fn new(
        video_id: VideoId,
        video_file_local_path: impl Into<String>,
        thumbnail_local_path: impl Into<String>,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            video_id,
            video_file_local_path: video_file_local_path.into(),
            thumbnail_local_path: thumbnail_local_path.into(),
            created_at: Utc::now(),
        }
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("process:{}", self.video_id)
    }
}

/// Job envelope for the queue, serialized as `{"name": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum QueueJob {
    #[serde(rename = "processVideo")]
    ProcessVideo(ProcessVideoJob),
}

impl QueueJob {
    /// Get the job ID.
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::ProcessVideo(j) => &j.job_id,
        }
    }

    /// Get the wire name of the job.
    pub fn name(&self) -> &'static str {
        match self {
            QueueJob::ProcessVideo(_) => PROCESS_VIDEO_JOB,
        }
    }

    /// Get the idempotency key.
    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::ProcessVideo(j) => j.idempotency_key(),
        }
    }

    pub fn video_id(&self) -> &VideoId {
        match self {
            QueueJob::ProcessVideo(j) => &j.video_id,
        }
    }
}

/// A job delivered to a consumer.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    /// Stream entry ID, needed to acknowledge the delivery
    pub message_id: String,
    pub job: QueueJob,
    /// 1-based attempt number maintained by the queue
    pub attempt: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let job = QueueJob::ProcessVideo(ProcessVideoJob::new(
            VideoId::from_string("vid-1"),
            "/tmp/v.mp4",
            "/tmp/t.jpg",
        ));
        let json = serde_json::to_value(&job).unwrap();

        assert_eq!(json["name"], "processVideo");
        assert_eq!(json["data"]["videoId"], "vid-1");
        assert_eq!(json["data"]["videoFileLocalPath"], "/tmp/v.mp4");
        assert_eq!(json["data"]["thumbnailLocalPath"], "/tmp/t.jpg");
    }

    #[test]
    fn test_idempotency_key_is_per_video() {
        let a = ProcessVideoJob::new(VideoId::from_string("vid-1"), "/a", "/b");
        let b = ProcessVideoJob::new(VideoId::from_string("vid-1"), "/c", "/d");
        assert_ne!(a.job_id, b.job_id);
        assert_eq!(a.idempotency_key(), b.idempotency_key());
    }
}
