//! Structured job logging utilities.

use tracing::{error, info, warn, Span};
use vtube_models::{JobId, VideoId};

/// Job logger carrying the job and video IDs on every event.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    video_id: String,
    attempt: u32,
}

impl JobLogger {
    pub fn new(job_id: &JobId, video_id: &VideoId, attempt: u32) -> Self {
        Self {
            job_id: job_id.to_string(),
            video_id: video_id.to_string(),
            attempt,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            video_id = %self.video_id,
            attempt = self.attempt,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            video_id = %self.video_id,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            video_id = %self.video_id,
            attempt = self.attempt,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            video_id = %self.video_id,
            attempt = self.attempt,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            video_id = %self.video_id,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Span wrapping the whole job, so upload and store events inherit its fields.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            video_id = %self.video_id,
            attempt = self.attempt
        )
    }
}
