//! Job handlers and execution context.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use ledgerbox_core::{Job, JobType};

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    /// Get the job payload.
    pub fn payload(&self) -> Option<&JsonValue> {
        self.job.payload.as_ref()
    }

    /// Deserialize the job payload into a typed value.
    pub fn parse_payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        let payload = self
            .payload()
            .ok_or_else(|| "Missing job payload".to_string())?;
        serde_json::from_value(payload.clone()).map_err(|e| format!("Invalid job payload: {}", e))
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully with optional result data.
    Success(Option<JsonValue>),
    /// Job failed; the queue's retry policy decides redelivery.
    Failed(String),
    /// Transient failure; same retry policy, kept distinct for logging.
    Retry(String),
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

    async fn execute(&self, _ctx: JobContext) -> JobResult {
        JobResult::Success(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ledgerbox_core::JobStatus;
    use serde_json::json;
    use uuid::Uuid;

    fn test_job(payload: Option<JsonValue>) -> Job {
        Job {
            id: Uuid::new_v4(),
            job_type: JobType::ProcessAttachment,
            status: JobStatus::Pending,
            priority: 7,
            payload,
            result: None,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
            run_after: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_job_context_payload_none() {
        let ctx = JobContext::new(test_job(None));
        assert!(ctx.payload().is_none());
    }

    #[test]
    fn test_job_context_payload_some() {
        let ctx = JobContext::new(test_job(Some(json!({"key": "value"}))));
        assert_eq!(ctx.payload().unwrap()["key"], "value");
    }

    #[test]
    fn test_parse_payload_missing() {
        let ctx = JobContext::new(test_job(None));
        let parsed: Result<serde_json::Value, _> = ctx.parse_payload();
        assert!(parsed.unwrap_err().contains("Missing job payload"));
    }

    #[test]
    fn test_parse_payload_typed() {
        #[derive(serde::Deserialize)]
        struct P {
            count: i32,
        }
        let ctx = JobContext::new(test_job(Some(json!({"count": 3}))));
        let parsed: P = ctx.parse_payload().unwrap();
        assert_eq!(parsed.count, 3);
    }

    #[test]
    fn test_parse_payload_type_mismatch() {
        #[derive(serde::Deserialize, Debug)]
        #[allow(dead_code)]
        struct P {
            count: i32,
        }
        let ctx = JobContext::new(test_job(Some(json!({"count": "three"}))));
        let parsed: Result<P, _> = ctx.parse_payload();
        assert!(parsed.unwrap_err().contains("Invalid job payload"));
    }

    #[tokio::test]
    async fn test_noop_handler() {
        let handler = NoOpHandler::new(JobType::ProcessAttachment);
        assert_eq!(handler.job_type(), JobType::ProcessAttachment);
        assert!(handler.can_handle(JobType::ProcessAttachment));
        assert!(!handler.can_handle(JobType::ExtractInvoice));

        let result = handler.execute(JobContext::new(test_job(None))).await;
        assert!(matches!(result, JobResult::Success(None)));
    }
}
