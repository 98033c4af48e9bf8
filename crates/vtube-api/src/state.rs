//! Application state.

use std::sync::Arc;
use std::time::Instant;

use vtube_firestore::{VideoRepository, VideoStore};
use vtube_queue::{JobPublisher, JobQueue};

use crate::auth::JwtVerifier;
use crate::config::ApiConfig;
use crate::intake::PublishIntake;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn VideoStore>,
    /// Used for readiness only; jobs go through `intake`
    pub queue: Arc<JobQueue>,
    pub intake: Arc<PublishIntake>,
    pub auth: Arc<JwtVerifier>,
    pub started_at: Instant,
}

impl AppState {
    /// Create application state from the environment.
    pub async fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn VideoStore> = Arc::new(VideoRepository::from_env().await?);
        let queue = Arc::new(JobQueue::from_env()?);
        queue.init().await?;
        let auth = JwtVerifier::from_env()?;

        let publisher: Arc<dyn JobPublisher> = queue.clone();
        Ok(Self::from_parts(config, store, publisher, queue, auth))
    }

    /// Assemble state from already constructed components.
    pub fn from_parts(
        config: ApiConfig,
        store: Arc<dyn VideoStore>,
        publisher: Arc<dyn JobPublisher>,
        queue: Arc<JobQueue>,
        auth: JwtVerifier,
    ) -> Self {
        let intake = Arc::new(PublishIntake::new(Arc::clone(&store), publisher));
        Self {
            config,
            store,
            queue,
            intake,
            auth: Arc::new(auth),
            started_at: Instant::now(),
        }
    }
}
