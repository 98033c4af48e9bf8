//! Upload/delete gateway used by the processing worker.

use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::{R2Client, R2Config};
use crate::error::{StorageError, StorageResult};

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedMedia {
    /// Public URL of the hosted object
    pub url: String,
    /// Identifier accepted by [`MediaGateway::delete`]
    pub public_id: String,
    /// Duration in seconds for video and audio content
    pub duration: Option<f64>,
}

/// Remote media host.
#[async_trait]
pub trait MediaGateway: Send + Sync {
    /// Upload a local file. The local file is left in place.
    async fn upload(&self, local_path: &Path) -> StorageResult<UploadedMedia>;

    /// Delete a previously uploaded object.
    async fn delete(&self, public_id: &str) -> StorageResult<()>;
}

/// [`MediaGateway`] backed by an R2 bucket.
#[derive(Clone)]
pub struct R2MediaGateway {
    client: R2Client,
    folder: String,
}

impl R2MediaGateway {
    pub fn new(client: R2Client, folder: impl Into<String>) -> Self {
        Self {
            client,
            folder: folder.into(),
        }
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = R2Config::from_env()?;
        let folder = config.folder.clone();
        Ok(Self::new(R2Client::new(config).await?, folder))
    }
}

#[async_trait]
impl MediaGateway for R2MediaGateway {
    async fn upload(&self, local_path: &Path) -> StorageResult<UploadedMedia> {
        match tokio::fs::metadata(local_path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(StorageError::MissingLocalFile(local_path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::MissingLocalFile(local_path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        }

        let key = object_key(&self.folder, local_path);
        let mime = mime_guess::from_path(local_path).first_or_octet_stream();

        self.client
            .upload_file(local_path, &key, mime.essence_str())
            .await?;

        let duration = if has_duration(&mime) {
            match vtube_media::probe_duration(local_path).await {
                Ok(d) => Some(d),
                Err(e) => {
                    warn!("Could not read duration of {}: {}", local_path.display(), e);
                    None
                }
            }
        } else {
            None
        };

        info!(public_id = %key, "Uploaded {} ({})", local_path.display(), mime);

        Ok(UploadedMedia {
            url: self.client.public_url(&key),
            public_id: key,
            duration,
        })
    }

    async fn delete(&self, public_id: &str) -> StorageResult<()> {
        self.client.delete_object(public_id).await
    }
}

fn has_duration(mime: &mime_guess::Mime) -> bool {
    mime.type_() == mime_guess::mime::VIDEO || mime.type_() == mime_guess::mime::AUDIO
}

/// Build a collision-free object key: `<folder>/<millis>-<uuid8>.<ext>`.
fn object_key(folder: &str, local_path: &Path) -> String {
    let stamp = chrono::Utc::now().timestamp_millis();
    let unique = Uuid::new_v4().simple().to_string();
    let ext = local_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();

    let name = format!("{}-{}{}", stamp, &unique[..8], ext);
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name
    } else {
        format!("{}/{}", folder, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_layout() {
        let key = object_key("youtube-tweet", Path::new("/tmp/uploads/My Clip.MP4"));
        assert!(key.starts_with("youtube-tweet/"));
        assert!(key.ends_with(".mp4"));
        assert!(!key.contains(' '));
    }

    #[test]
    fn test_object_keys_differ() {
        let path = Path::new("/tmp/t.jpg");
        assert_ne!(object_key("f", path), object_key("f", path));
    }

    #[test]
    fn test_object_key_without_folder_or_extension() {
        let key = object_key("", Path::new("/tmp/blob"));
        assert!(!key.contains('/'));
        assert!(!key.contains('.'));
    }

    #[tokio::test]
    async fn test_upload_of_missing_file_fails_before_any_request() {
        let client = R2Client::new(R2Config {
            endpoint_url: "http://127.0.0.1:1".to_string(),
            access_key_id: "id".to_string(),
            secret_access_key: "secret".to_string(),
            bucket_name: "media".to_string(),
            region: "auto".to_string(),
            public_base_url: "http://cdn.test".to_string(),
            folder: "f".to_string(),
        })
        .await
        .unwrap();
        let gateway = R2MediaGateway::new(client, "f");
        let err = gateway
            .upload(Path::new("/definitely/not/here.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::MissingLocalFile(_)));
    }

    #[test]
    fn test_duration_only_for_timed_media() {
        let video = mime_guess::from_path("a.mp4").first_or_octet_stream();
        let image = mime_guess::from_path("a.jpg").first_or_octet_stream();
        assert!(has_duration(&video));
        assert!(!has_duration(&image));
    }
}
