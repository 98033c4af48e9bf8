//! Video record models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a video record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Publish status of a video record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Uploads have not finished yet
    #[default]
    Processing,
    /// Both media assets are hosted and the video is visible
    Published,
    /// Processing failed; no media is attached
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Processing => "processing",
            VideoStatus::Published => "published",
            VideoStatus::Failed => "failed",
        }
    }

    /// Whether the pipeline will no longer move the record out of this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Published | VideoStatus::Failed)
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown video status: {0}")]
pub struct ParseVideoStatusError(pub String);

impl FromStr for VideoStatus {
    type Err = ParseVideoStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(VideoStatus::Processing),
            "published" => Ok(VideoStatus::Published),
            "failed" => Ok(VideoStatus::Failed),
            other => Err(ParseVideoStatusError(other.to_string())),
        }
    }
}

/// A media file hosted by the storage gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    /// Public URL of the hosted object
    pub url: String,

    /// Storage identifier used for deletion
    pub public_id: String,
}

impl MediaAsset {
    pub fn new(url: impl Into<String>, public_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            public_id: public_id.into(),
        }
    }
}

/// A video record as persisted in the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    /// Unique video ID
    pub id: VideoId,

    pub title: String,

    pub description: String,

    /// Owner user ID. Never changes after creation.
    #[serde(rename = "owner")]
    pub owner_id: String,

    #[serde(default)]
    pub status: VideoStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_file: Option<MediaAsset>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<MediaAsset>,

    /// Duration in seconds, known only once the video is published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    #[serde(default)]
    pub is_published: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl VideoRecord {
    /// Create a placeholder record in the `processing` state with no media.
    pub fn placeholder(
        title: impl Into<String>,
        description: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: VideoId::new(),
            title: title.into(),
            description: description.into(),
            owner_id: owner_id.into(),
            status: VideoStatus::Processing,
            video_file: None,
            thumbnail: None,
            duration: None,
            is_published: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// `is_published` holds exactly when the status is `published`, which
    /// in turn holds exactly when both media assets are attached.
    pub fn is_consistent(&self) -> bool {
        let published = self.status == VideoStatus::Published;
        let has_media = self.video_file.is_some() && self.thumbnail.is_some();
        self.is_published == published && published == has_media
    }
}

/// The state transitions the publish pipeline applies to a record.
///
/// Each variant is written as one field set; stores must apply it atomically.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoUpdate {
    Published {
        video_file: MediaAsset,
        thumbnail: MediaAsset,
        duration: Option<f64>,
    },
    Failed,
}

impl VideoUpdate {
    pub fn status(&self) -> VideoStatus {
        match self {
            VideoUpdate::Published { .. } => VideoStatus::Published,
            VideoUpdate::Failed => VideoStatus::Failed,
        }
    }

    /// Apply the update to an in-memory record.
    pub fn apply_to(&self, record: &mut VideoRecord) {
        match self {
            VideoUpdate::Published {
                video_file,
                thumbnail,
                duration,
            } => {
                record.video_file = Some(video_file.clone());
                record.thumbnail = Some(thumbnail.clone());
                record.duration = *duration;
                record.is_published = true;
            }
            VideoUpdate::Failed => {
                record.video_file = None;
                record.thumbnail = None;
                record.duration = None;
                record.is_published = false;
            }
        }
        record.status = self.status();
        record.updated_at = Utc::now();
    }
}
