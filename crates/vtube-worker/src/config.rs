//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs processed at the same time
    pub concurrency: usize,
    /// Bound on a single upload; expiry counts as an upload failure
    pub upload_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How long a consume call blocks waiting for jobs
    pub consume_block: Duration,
    /// How often the worker should scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed (crash recovery)
    pub claim_min_idle: Duration,
    /// How often due retries are moved back onto the stream
    pub promote_interval: Duration,
    /// Port for the Prometheus scrape endpoint, disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            upload_timeout: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(60),
            consume_block: Duration::from_secs(1),
            claim_interval: Duration::from_secs(30),
            // Must outlast two back-to-back upload timeouts plus the record write
            claim_min_idle: Duration::from_secs(900),
            promote_interval: Duration::from_secs(1),
            metrics_port: None,
        }
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            concurrency: std::env::var("WORKER_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default.concurrency),
            upload_timeout: env_secs("WORKER_UPLOAD_TIMEOUT_SECS", default.upload_timeout),
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT_SECS", default.shutdown_timeout),
            consume_block: default.consume_block,
            claim_interval: env_secs("WORKER_CLAIM_INTERVAL_SECS", default.claim_interval),
            claim_min_idle: env_secs("WORKER_CLAIM_MIN_IDLE_SECS", default.claim_min_idle),
            promote_interval: std::env::var("WORKER_PROMOTE_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default.promote_interval),
            metrics_port: std::env::var("WORKER_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}
