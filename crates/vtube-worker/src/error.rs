//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// One or both media uploads failed or timed out.
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Uploads succeeded but the record could not be written.
    #[error("Record update failed: {0}")]
    StorageUpdate(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] vtube_storage::StorageError),

    #[error("Record store error: {0}")]
    Firestore(#[from] vtube_firestore::FirestoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] vtube_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    pub fn storage_update(msg: impl Into<String>) -> Self {
        Self::StorageUpdate(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Upload(_) => "upload",
            WorkerError::StorageUpdate(_) => "storage_update",
            WorkerError::ConfigError(_) => "config",
            WorkerError::Storage(_) => "storage",
            WorkerError::Firestore(_) => "record_store",
            WorkerError::Queue(_) => "queue",
            WorkerError::Io(_) => "io",
        }
    }
}
