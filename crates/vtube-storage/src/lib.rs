//! Media storage gateway.
//!
//! This crate provides:
//! - An S3-compatible client for Cloudflare R2
//! - The [`MediaGateway`] abstraction the worker uploads through

pub mod client;
pub mod error;
pub mod gateway;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use gateway::{MediaGateway, R2MediaGateway, UploadedMedia};
