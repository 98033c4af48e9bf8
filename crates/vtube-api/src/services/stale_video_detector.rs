//! Background service that fails records stuck in `processing`.
//!
//! A record can be left behind when its job never made it into the queue,
//! or was dead-lettered while the record write itself kept failing. The
//! transition is conditional, so a worker that publishes concurrently wins.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info, warn};

use vtube_firestore::VideoStore;

use crate::config::ApiConfig;
use crate::metrics;

/// Records examined per sweep.
const BATCH_SIZE: usize = 100;

/// Stale video detector service.
pub struct StaleVideoDetector {
    store: Arc<dyn VideoStore>,
    threshold: Duration,
    check_interval: Duration,
    enabled: bool,
}

impl StaleVideoDetector {
    pub fn new(
        store: Arc<dyn VideoStore>,
        threshold: Duration,
        check_interval: Duration,
        enabled: bool,
    ) -> Self {
        Self {
            store,
            threshold,
            check_interval,
            enabled,
        }
    }

    /// Build from the API configuration.
    pub fn from_config(store: Arc<dyn VideoStore>, config: &ApiConfig) -> Self {
        Self::new(
            store,
            config.stale_video_threshold,
            config.stale_check_interval,
            config.stale_detection_enabled,
        )
    }

    /// Start the background detection loop. Runs until the task is dropped.
    pub async fn run(&self) {
        if !self.enabled {
            info!("Stale video detection is disabled");
            return;
        }

        info!(
            "Starting stale video detector (threshold: {:?}, interval: {:?})",
            self.threshold, self.check_interval
        );

        let mut ticker = interval(self.check_interval);
        loop {
            ticker.tick().await;

            match self.sweep().await {
                Ok(0) => {}
                Ok(failed) => info!("Marked {} stale videos as failed", failed),
                Err(e) => error!("Stale video detection error: {}", e),
            }
        }
    }

    /// Run one detection pass and return how many records were failed.
    pub async fn sweep(&self) -> anyhow::Result<u64> {
        let threshold = chrono::Duration::from_std(self.threshold)?;
        let cutoff = chrono::Utc::now() - threshold;

        let stale = self.store.list_processing_before(cutoff, BATCH_SIZE).await?;
        let mut failed = 0u64;

        for record in stale {
            match self.store.fail_if_processing(&record.id).await {
                Ok(true) => {
                    failed += 1;
                    warn!(
                        video_id = %record.id,
                        created_at = %record.created_at,
                        "Video stuck in processing, marked failed"
                    );
                }
                Ok(false) => {}
                Err(e) => error!(video_id = %record.id, "Failed to mark stale video: {}", e),
            }
        }

        if failed > 0 {
            metrics::record_stale_videos_failed(failed);
        }
        Ok(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtube_firestore::MemoryVideoStore;
    use vtube_models::{MediaAsset, VideoRecord, VideoStatus, VideoUpdate};

    async fn aged(store: &MemoryVideoStore, minutes: i64) -> VideoRecord {
        let mut record = VideoRecord::placeholder("T", "D", "u");
        record.created_at = chrono::Utc::now() - chrono::Duration::minutes(minutes);
        store.insert(record.clone()).await;
        record
    }

    #[tokio::test]
    async fn test_sweep_fails_only_old_processing_records() {
        let store = Arc::new(MemoryVideoStore::new());
        let old = aged(&store, 180).await;
        let fresh = aged(&store, 5).await;
        let published = aged(&store, 240).await;
        store
            .update_by_id(
                &published.id,
                &VideoUpdate::Published {
                    video_file: MediaAsset::new("u", "p"),
                    thumbnail: MediaAsset::new("u2", "p2"),
                    duration: Some(1.0),
                },
            )
            .await
            .unwrap();

        let detector = StaleVideoDetector::new(
            store.clone(),
            Duration::from_secs(7200),
            Duration::from_secs(60),
            true,
        );
        assert_eq!(detector.sweep().await.unwrap(), 1);

        let status = |id| {
            let store = store.clone();
            async move { store.get(&id).await.unwrap().unwrap().status }
        };
        assert_eq!(status(old.id).await, VideoStatus::Failed);
        assert_eq!(status(fresh.id).await, VideoStatus::Processing);
        assert_eq!(status(published.id).await, VideoStatus::Published);

        // Nothing left to do on the next pass
        assert_eq!(detector.sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disabled_detector_returns_immediately() {
        let store = Arc::new(MemoryVideoStore::new());
        let old = aged(&store, 600).await;
        let config = ApiConfig {
            stale_detection_enabled: false,
            ..ApiConfig::default()
        };

        let detector = StaleVideoDetector::from_config(store.clone(), &config);
        tokio::time::timeout(Duration::from_secs(1), detector.run())
            .await
            .unwrap();

        assert_eq!(
            store.get(&old.id).await.unwrap().unwrap().status,
            VideoStatus::Processing
        );
    }
}
