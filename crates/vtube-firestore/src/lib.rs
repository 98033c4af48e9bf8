//! Persistent video record store.
//!
//! This crate provides:
//! - The [`VideoStore`] abstraction used by the intake handler and the worker
//! - A Firestore REST client with cached service-account auth and retries
//! - [`VideoRepository`], the Firestore-backed store
//! - [`MemoryVideoStore`], an in-process store for tests and local runs

pub mod client;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod repos;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use memory::MemoryVideoStore;
pub use repos::VideoRepository;
pub use store::{MockVideoStore, VideoStore};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
