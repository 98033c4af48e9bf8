//! R2 client implementation.

use std::path::Path;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
    /// Base URL objects are publicly served from
    pub public_base_url: String,
    /// Key prefix for uploaded media
    pub folder: String,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let endpoint_url = std::env::var("R2_ENDPOINT_URL")
            .map_err(|_| StorageError::config_error("R2_ENDPOINT_URL not set"))?;
        let bucket_name = std::env::var("R2_BUCKET_NAME")
            .map_err(|_| StorageError::config_error("R2_BUCKET_NAME not set"))?;
        let public_base_url = std::env::var("MEDIA_PUBLIC_BASE_URL").unwrap_or_else(|_| {
            format!("{}/{}", endpoint_url.trim_end_matches('/'), bucket_name)
        });

        Ok(Self {
            access_key_id: std::env::var("R2_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("R2_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("R2_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("R2_SECRET_ACCESS_KEY not set"))?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
            folder: std::env::var("MEDIA_FOLDER").unwrap_or_else(|_| "youtube-tweet".to_string()),
            endpoint_url,
            bucket_name,
            public_base_url,
        })
    }
}

/// Cloudflare R2 storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl R2Client {
    /// Create a new R2 client from configuration.
    pub async fn new(config: R2Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = Client::from_conf(sdk_config);

        Ok(Self {
            client,
            bucket: config.bucket_name,
            public_base_url: config.public_base_url,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = R2Config::from_env()?;
        Self::new(config).await
    }

    /// Public URL an object is served from.
    pub fn public_url(&self, key: &str) -> String {
        public_url(&self.public_base_url, key)
    }

    /// Upload a file to R2.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", path.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    /// Delete an object. Deleting a missing key succeeds.
    pub async fn delete_object(&self, key: &str) -> StorageResult<()> {
        debug!("Deleting {}", key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        Ok(())
    }

    /// Check if an object exists.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.to_string().contains("NotFound") || e.to_string().contains("NoSuchKey") {
                    Ok(false)
                } else {
                    Err(StorageError::AwsSdk(e.to_string()))
                }
            }
        }
    }

    /// Check connectivity to R2 by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("R2 connectivity check failed: {}", e)))?;
        Ok(())
    }
}

pub(crate) fn public_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_public_url_joins_once() {
        assert_eq!(
            public_url("https://cdn.example.com/", "youtube-tweet/a.mp4"),
            "https://cdn.example.com/youtube-tweet/a.mp4"
        );
        assert_eq!(public_url("https://cdn.example.com", "/k"), "https://cdn.example.com/k");
    }

    #[test]
    #[serial]
    fn test_config_requires_credentials() {
        std::env::remove_var("R2_ENDPOINT_URL");
        let err = R2Config::from_env().unwrap_err();
        assert!(matches!(err, StorageError::ConfigError(_)));
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        std::env::set_var("R2_ENDPOINT_URL", "https://acct.r2.cloudflarestorage.com");
        std::env::set_var("R2_BUCKET_NAME", "media");
        std::env::set_var("R2_ACCESS_KEY_ID", "id");
        std::env::set_var("R2_SECRET_ACCESS_KEY", "secret");
        std::env::remove_var("MEDIA_PUBLIC_BASE_URL");
        std::env::remove_var("MEDIA_FOLDER");

        let config = R2Config::from_env().unwrap();

        for key in [
            "R2_ENDPOINT_URL",
            "R2_BUCKET_NAME",
            "R2_ACCESS_KEY_ID",
            "R2_SECRET_ACCESS_KEY",
        ] {
            std::env::remove_var(key);
        }

        assert_eq!(config.region, "auto");
        assert_eq!(config.folder, "youtube-tweet");
        assert_eq!(
            config.public_base_url,
            "https://acct.r2.cloudflarestorage.com/media"
        );
    }
}
