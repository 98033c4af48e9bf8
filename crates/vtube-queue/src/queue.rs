//! Job queue using Redis Streams.

use std::time::Duration;

use redis::streams::{StreamAutoClaimReply, StreamId, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::{ProcessVideoJob, QueueJob, QueuedJob};
use crate::policy::RetryPolicy;

/// Moves due members of the delayed set back onto the stream.
///
/// Members are encoded as `<attempt>:<payload>`.
const PROMOTE_DUE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
for _, member in ipairs(due) do
    local sep = string.find(member, ':', 1, true)
    if sep then
        local attempt = string.sub(member, 1, sep - 1)
        local payload = string.sub(member, sep + 1)
        redis.call('XADD', KEYS[2], '*', 'job', payload, 'attempt', attempt)
    end
    redis.call('ZREM', KEYS[1], member)
end
return #due
"#;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Sorted set holding jobs waiting out their back-off
    pub delayed_set_name: String,
    /// How long a duplicate enqueue is rejected
    pub dedup_ttl: Duration,
    pub retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vtube:video-processing".to_string(),
            consumer_group: "vtube:workers".to_string(),
            dlq_stream_name: "vtube:video-processing:dlq".to_string(),
            delayed_set_name: "vtube:video-processing:delayed".to_string(),
            dedup_ttl: Duration::from_secs(86400),
            retry: RetryPolicy::default(),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(default.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(default.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(default.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(default.dlq_stream_name),
            delayed_set_name: std::env::var("QUEUE_DELAYED_SET")
                .unwrap_or(default.delayed_set_name),
            dedup_ttl: std::env::var("QUEUE_DEDUP_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.dedup_ttl),
            retry: RetryPolicy::from_env(),
        }
    }
}

/// What the queue did with a job whose processing failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDisposition {
    /// The job will be re-delivered as `next_attempt` after `delay`.
    RetryScheduled { next_attempt: u32, delay: Duration },
    /// Attempts are exhausted and the job was moved to the dead-letter stream.
    DeadLettered,
    /// Attempts are exhausted and the job was dropped.
    Discarded,
}

impl FailureDisposition {
    /// Whether the queue will never deliver this job again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FailureDisposition::RetryScheduled { .. })
    }
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
    promote_script: redis::Script,
}

impl JobQueue {
    /// Create a new job queue. Does not connect until the first command.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            promote_script: redis::Script::new(PROMOTE_DUE_SCRIPT),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn dedup_key(idempotency_key: &str) -> String {
        format!("vtube:dedup:{}", idempotency_key)
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        // Create consumer group (ignore error if already exists)
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }

    /// Enqueue a process video job.
    pub async fn enqueue_process(&self, job: ProcessVideoJob) -> QueueResult<String> {
        self.enqueue(QueueJob::ProcessVideo(job)).await
    }

    /// Enqueue a job as its first attempt. Returns the stream message ID.
    pub async fn enqueue(&self, job: QueueJob) -> QueueResult<String> {
        let mut conn = self.connection().await?;

        let payload = serde_json::to_string(&job)?;
        let idempotency_key = job.idempotency_key();
        let dedup_key = Self::dedup_key(&idempotency_key);

        // SET NX claims the key atomically so two producers cannot both pass
        let claimed: bool = redis::cmd("SET")
            .arg(&dedup_key)
            .arg(job.job_id().as_str())
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl.as_secs().max(1))
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !claimed {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::Duplicate(idempotency_key));
        }

        let added: Result<String, redis::RedisError> = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("attempt")
            .arg(1u32)
            .query_async(&mut conn)
            .await;

        let message_id = match added {
            Ok(id) => id,
            Err(e) => {
                let _: Result<(), _> = conn.del(&dedup_key).await;
                return Err(e.into());
            }
        };

        info!(
            job_id = %job.job_id(),
            video_id = %job.video_id(),
            "Enqueued {} job with message ID {}",
            job.name(),
            message_id
        );

        Ok(message_id)
    }

    /// Acknowledge a completed job and release its dedup key.
    pub async fn ack(&self, job: &QueuedJob) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&job.message_id)
            .ignore();
        if self.config.retry.remove_on_complete {
            pipe.cmd("XDEL")
                .arg(&self.config.stream_name)
                .arg(&job.message_id)
                .ignore();
        }
        pipe.cmd("DEL")
            .arg(Self::dedup_key(&job.job.idempotency_key()))
            .ignore();
        pipe.query_async::<()>(&mut conn).await?;

        debug!("Acknowledged job: {}", job.message_id);
        Ok(())
    }

    /// Acknowledge and drop a stream entry that cannot be parsed.
    async fn discard_entry(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .ignore()
            .cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Report a failed attempt and apply the retry policy.
    ///
    /// The original delivery is acknowledged in the same transaction that
    /// schedules the retry or dead-letters the job.
    pub async fn fail(&self, job: &QueuedJob, error: &str) -> QueueResult<FailureDisposition> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(&job.job)?;
        let policy = &self.config.retry;

        let mut pipe = redis::pipe();
        pipe.atomic();

        let disposition = if policy.should_retry(job.attempt) {
            let delay = policy.delay_for(job.attempt);
            let next_attempt = job.attempt + 1;
            let due_at = chrono::Utc::now().timestamp_millis() + delay.as_millis() as i64;
            pipe.cmd("ZADD")
                .arg(&self.config.delayed_set_name)
                .arg(due_at)
                .arg(format!("{}:{}", next_attempt, payload))
                .ignore();
            FailureDisposition::RetryScheduled {
                next_attempt,
                delay,
            }
        } else {
            if !policy.remove_on_fail {
                pipe.cmd("XADD")
                    .arg(&self.config.dlq_stream_name)
                    .arg("*")
                    .arg("job")
                    .arg(&payload)
                    .arg("error")
                    .arg(error)
                    .arg("original_id")
                    .arg(&job.message_id)
                    .arg("attempts")
                    .arg(job.attempt)
                    .arg("failed_at")
                    .arg(chrono::Utc::now().to_rfc3339())
                    .ignore();
            }
            pipe.cmd("DEL")
                .arg(Self::dedup_key(&job.job.idempotency_key()))
                .ignore();
            if policy.remove_on_fail {
                FailureDisposition::Discarded
            } else {
                FailureDisposition::DeadLettered
            }
        };

        pipe.cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&job.message_id)
            .ignore()
            .cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(&job.message_id)
            .ignore();
        pipe.query_async::<()>(&mut conn).await?;

        match &disposition {
            FailureDisposition::RetryScheduled {
                next_attempt,
                delay,
            } => info!(
                job_id = %job.job.job_id(),
                "Scheduled attempt {}/{} in {:?}: {}",
                next_attempt,
                policy.attempts,
                delay,
                error
            ),
            _ => warn!(
                job_id = %job.job.job_id(),
                "Job exhausted {} attempts ({:?}): {}",
                job.attempt,
                disposition,
                error
            ),
        }

        Ok(disposition)
    }

    /// Move delayed jobs whose back-off has elapsed back onto the stream.
    pub async fn promote_due(&self, limit: usize) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let now_ms = chrono::Utc::now().timestamp_millis();

        let promoted: u64 = self
            .promote_script
            .key(&self.config.delayed_set_name)
            .key(&self.config.stream_name)
            .arg(now_ms)
            .arg(limit)
            .invoke_async(&mut conn)
            .await?;

        if promoted > 0 {
            debug!("Promoted {} delayed jobs", promoted);
        }
        Ok(promoted)
    }

    /// Consume new jobs from the queue, blocking up to `block_ms`.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<QueuedJob>> {
        let mut conn = self.connection().await?;

        // Read from consumer group; nil reply when the block times out
        let result: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();
        for stream_key in result.unwrap_or_default().keys {
            for entry in stream_key.ids {
                if let Some(job) = self.parse_entry(entry).await {
                    debug!("Consumed job {} from stream", job.job.job_id());
                    jobs.push(job);
                }
            }
        }

        Ok(jobs)
    }

    /// Claim jobs left pending by consumers that stopped responding.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<QueuedJob>> {
        let mut conn = self.connection().await?;

        let result: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();
        for entry in result.claimed {
            if let Some(job) = self.parse_entry(entry).await {
                info!("Claimed pending job {} from stream", job.job.job_id());
                jobs.push(job);
            }
        }

        Ok(jobs)
    }

    async fn parse_entry(&self, entry: StreamId) -> Option<QueuedJob> {
        let message_id = entry.id.clone();
        let attempt = entry.get::<u32>("attempt").unwrap_or(1).max(1);

        let parsed = entry
            .get::<String>("job")
            .ok_or_else(|| QueueError::Serialization("missing job field".to_string()))
            .and_then(|payload| serde_json::from_str::<QueueJob>(&payload).map_err(Into::into));

        match parsed {
            Ok(job) => Some(QueuedJob {
                message_id,
                job,
                attempt,
            }),
            Err(e) => {
                warn!("Failed to parse job payload {}: {}", message_id, e);
                // Ack the malformed message to prevent reprocessing
                self.discard_entry(&message_id).await.ok();
                None
            }
        }
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Number of jobs waiting out a back-off delay.
    pub async fn delayed_len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.zcard(&self.config.delayed_set_name).await?;
        Ok(len)
    }

    /// Ping the backend.
    pub async fn health_check(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
