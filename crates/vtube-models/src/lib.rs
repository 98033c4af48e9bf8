//! Shared data models for the VideoTube backend.
//!
//! This crate provides Serde-serializable types for:
//! - Video records and their publish lifecycle
//! - Hosted media assets
//! - Job identifiers shared by the queue and the worker

pub mod job;
pub mod video;

// Re-export common types
pub use job::JobId;
pub use video::{
    MediaAsset, ParseVideoStatusError, VideoId, VideoRecord, VideoStatus, VideoUpdate,
};
