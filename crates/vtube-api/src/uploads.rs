//! Multipart publish form handling.
//!
//! File parts are streamed straight to disk under the upload directory; the
//! worker deletes them once the job reaches a terminal state.

use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use axum::extract::Multipart;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::security::sanitize_filename;

pub const VIDEO_FILE_FIELD: &str = "videoFile";
pub const THUMBNAIL_FIELD: &str = "thumbnail";

/// Fields of a publish form after the files have been staged.
#[derive(Debug, Default)]
pub struct PublishForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub video_file: Option<PathBuf>,
    pub thumbnail: Option<PathBuf>,
}

impl PublishForm {
    /// Staged file paths.
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.video_file.iter().chain(self.thumbnail.iter())
    }

    /// Delete every staged file. Used when the request is rejected.
    pub async fn discard_files(&self) {
        for path in self.files() {
            remove_quietly(path).await;
        }
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Discarded staged upload {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to discard staged upload {}: {}", path.display(), e),
    }
}

/// Read a publish form, staging file parts in `upload_dir`.
///
/// On error every file staged so far is removed again.
pub async fn read_publish_form(
    mut multipart: Multipart,
    upload_dir: &Path,
) -> ApiResult<PublishForm> {
    tokio::fs::create_dir_all(upload_dir).await?;

    let mut form = PublishForm::default();
    let result = read_fields(&mut multipart, upload_dir, &mut form).await;
    if let Err(e) = result {
        form.discard_files().await;
        return Err(e);
    }
    Ok(form)
}

async fn read_fields(
    multipart: &mut Multipart,
    upload_dir: &Path,
    form: &mut PublishForm,
) -> ApiResult<()> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            VIDEO_FILE_FIELD | THUMBNAIL_FIELD => {
                let slot = if name == VIDEO_FILE_FIELD {
                    &mut form.video_file
                } else {
                    &mut form.thumbnail
                };
                if slot.is_some() {
                    return Err(ApiError::bad_request(format!(
                        "Only one {} file is allowed.",
                        name
                    )));
                }
                *slot = stage_file(field, upload_dir).await?;
            }
            "title" => form.title = Some(read_text(field).await?),
            "description" => form.description = Some(read_text(field).await?),
            other => debug!("Ignoring unexpected form field '{}'", other),
        }
    }
    Ok(())
}

async fn read_text(field: Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Unreadable form field: {}", e)))
}

/// Stream one file part to a fresh file, returning its path.
///
/// An empty part (a file input left blank) stages nothing.
async fn stage_file(mut field: Field<'_>, upload_dir: &Path) -> ApiResult<Option<PathBuf>> {
    let original = field.file_name().unwrap_or("upload").to_string();
    let unique = Uuid::new_v4().simple().to_string();
    let path = upload_dir.join(format!("{}-{}", &unique[..12], sanitize_filename(&original)));

    let mut file = tokio::fs::File::create(&path).await?;
    let mut size = 0usize;

    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                size += chunk.len();
                if let Err(e) = file.write_all(&chunk).await {
                    drop(file);
                    remove_quietly(&path).await;
                    return Err(e.into());
                }
            }
            Ok(None) => break,
            Err(e) => {
                drop(file);
                remove_quietly(&path).await;
                return Err(ApiError::bad_request(format!("Upload interrupted: {}", e)));
            }
        }
    }
    file.flush().await?;

    if size == 0 {
        remove_quietly(&path).await;
        return Ok(None);
    }

    debug!("Staged {} ({} bytes) at {}", original, size, path.display());
    Ok(Some(path))
}
