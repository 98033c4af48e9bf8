//! Video publish and status handlers.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use vtube_models::{MediaAsset, VideoId, VideoRecord, VideoStatus};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::intake::PublishRequest;
use crate::metrics;
use crate::response::ApiResponse;
use crate::security::is_valid_video_id;
use crate::state::AppState;
use crate::uploads::read_publish_form;

/// Publish a video.
///
/// Stages both files, creates the record in `processing` and queues the
/// upload job. Responds 202 without waiting for processing. Anonymous
/// callers are rejected before the body is read.
pub async fn publish_video(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> ApiResult<ApiResponse<VideoRecord>> {
    let form = read_publish_form(multipart, &state.config.upload_dir).await?;

    let local_path = |p: &std::path::PathBuf| p.to_string_lossy().into_owned();
    let request = PublishRequest {
        title: form.title.clone(),
        description: form.description.clone(),
        video_file_local_path: form.video_file.as_ref().map(local_path),
        thumbnail_local_path: form.thumbnail.as_ref().map(local_path),
        owner_id: Some(user.id),
    };

    match state.intake.publish(request).await {
        Ok(record) => {
            metrics::record_publish_request("accepted");
            info!(video_id = %record.id, owner = %record.owner_id, "Publish accepted");
            Ok(ApiResponse::new(
                StatusCode::ACCEPTED,
                record,
                "Video uploaded successfully and is being processed.",
            ))
        }
        Err(e) => {
            metrics::record_publish_request("rejected");
            // No job owns the staged files
            form.discard_files().await;
            Err(e.into())
        }
    }
}

/// Processing state of a single video.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatusResponse {
    pub video_id: VideoId,
    pub status: VideoStatus,
    pub is_published: bool,
    pub video_file: Option<MediaAsset>,
    pub thumbnail: Option<MediaAsset>,
    pub duration: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl From<VideoRecord> for VideoStatusResponse {
    fn from(record: VideoRecord) -> Self {
        Self {
            video_id: record.id,
            status: record.status,
            is_published: record.is_published,
            video_file: record.video_file,
            thumbnail: record.thumbnail,
            duration: record.duration,
            updated_at: record.updated_at,
        }
    }
}

/// Get the processing status of one of the caller's videos.
pub async fn get_video_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(video_id): Path<String>,
) -> ApiResult<ApiResponse<VideoStatusResponse>> {
    if !is_valid_video_id(&video_id) {
        return Err(ApiError::bad_request("Invalid video id."));
    }

    let record = state
        .store
        .get(&VideoId::from(video_id.as_str()))
        .await?
        .ok_or_else(|| ApiError::not_found("Video not found."))?;

    if record.owner_id != user.id {
        return Err(ApiError::forbidden("You can only view the status of your own videos."));
    }

    Ok(ApiResponse::ok(
        VideoStatusResponse::from(record),
        "Video status fetched successfully.",
    ))
}
