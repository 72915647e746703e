//! Job handler contract shared by the two workers.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use cosmo_core::{Job, JobType};

/// Progress callback type for job handlers.
pub type ProgressCallback = Box<dyn Fn(i32, Option<&str>) + Send + Sync>;

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
    /// Progress callback for updating job progress.
    progress_callback: Option<ProgressCallback>,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job: Job) -> Self {
        Self {
            job,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(i32, Option<&str>) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Report progress to the callback.
    pub fn report_progress(&self, percent: i32, message: Option<&str>) {
        if let Some(ref callback) = self.progress_callback {
            callback(percent, message);
        }
    }

    /// Get the user ID for this job, if any.
    pub fn user_id(&self) -> Option<Uuid> {
        self.job.user_id
    }

    /// Get the job payload.
    pub fn payload(&self) -> Option<&JsonValue> {
        self.job.payload.as_ref()
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully with optional result data.
    Success(Option<JsonValue>),
    /// Transient failure; the queue retries with backoff, then dead-letters.
    Failed(String),
    /// Permanent input failure; acknowledged, never retried.
    Fatal(String),
    /// Not ready yet (e.g. embeddings still missing): push back to pending
    /// with a future `run_at`, optionally replacing the payload. Does not
    /// consume a retry.
    Reschedule {
        delay: Duration,
        payload: Option<JsonValue>,
    },
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;

    /// Check if this handler can process the given job type.
    fn can_handle(&self, job_type: JobType) -> bool {
        self.job_type() == job_type
    }
}

/// No-op handler for testing.
pub struct NoOpHandler {
    job_type: JobType,
}

impl NoOpHandler {
    /// Create a new no-op handler for the given job type.
    pub fn new(job_type: JobType) -> Self {
        Self { job_type }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        ctx.report_progress(50, Some("Processing..."));
        ctx.report_progress(100, Some("Done"));
        JobResult::Success(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_job;

    #[test]
    fn test_job_context_user_id() {
        let user_id = Uuid::new_v4();
        let mut job = test_job(JobType::GenerateEmbedding, None);
        job.user_id = Some(user_id);

        let ctx = JobContext::new(job);
        assert_eq!(ctx.user_id(), Some(user_id));
    }

    #[test]
    fn test_job_context_payload() {
        let payload = serde_json::json!({"entity_id": "abc", "text": "hello"});
        let job = test_job(JobType::GenerateEmbedding, Some(payload.clone()));

        let ctx = JobContext::new(job);
        assert_eq!(ctx.payload(), Some(&payload));
    }

    #[test]
    fn test_report_progress_without_callback_is_noop() {
        let ctx = JobContext::new(test_job(JobType::ProjectGraph, None));
        ctx.report_progress(50, Some("should not panic"));
    }

    #[test]
    fn test_progress_callback_receives_updates() {
        use std::sync::{Arc, Mutex};

        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();

        let ctx = JobContext::new(test_job(JobType::ProjectGraph, None))
            .with_progress_callback(move |percent, message| {
                log_clone
                    .lock()
                    .unwrap()
                    .push((percent, message.map(String::from)));
            });

        ctx.report_progress(25, Some("waiting"));
        ctx.report_progress(100, None);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], (25, Some("waiting".to_string())));
        assert_eq!(log[1], (100, None));
    }

    #[tokio::test]
    async fn test_noop_handler() {
        let handler = NoOpHandler::new(JobType::GenerateEmbedding);
        assert_eq!(handler.job_type(), JobType::GenerateEmbedding);
        assert!(handler.can_handle(JobType::GenerateEmbedding));
        assert!(!handler.can_handle(JobType::ProjectGraph));

        let ctx = JobContext::new(test_job(JobType::GenerateEmbedding, None));
        let result = handler.execute(ctx).await;
        assert!(matches!(result, JobResult::Success(None)));
    }

    #[test]
    fn test_job_result_variants() {
        assert!(matches!(JobResult::Success(None), JobResult::Success(None)));
        assert!(matches!(
            JobResult::Failed("timeout".to_string()),
            JobResult::Failed(_)
        ));
        assert!(matches!(
            JobResult::Fatal("bad id".to_string()),
            JobResult::Fatal(_)
        ));
        assert!(matches!(
            JobResult::Reschedule {
                delay: Duration::from_secs(3),
                payload: None
            },
            JobResult::Reschedule { .. }
        ));
    }
}
