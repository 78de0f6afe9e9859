//! Core traits for ledgerbox abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Job, JobType, QueueStats};

/// At-least-once job queue the pipeline both produces to and consumes from.
///
/// Implementations must make `claim_next_for_types` safe under concurrent
/// workers (no double delivery of a single claim) and apply the retry policy
/// in `fail`.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Queue a new job.
    async fn queue(
        &self,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
        max_retries: i32,
    ) -> Result<Uuid>;

    /// Claim the next pending job whose type is in `job_types`.
    /// An empty slice means "claim any type".
    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>>;

    /// Mark job as completed.
    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()>;

    /// Mark job as failed; re-queues with backoff while attempts remain.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Cancel a pending job.
    async fn cancel(&self, job_id: Uuid) -> Result<bool>;

    /// Get job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Get pending jobs count.
    async fn pending_count(&self) -> Result<i64>;

    /// Queue health summary.
    async fn queue_stats(&self) -> Result<QueueStats>;

    /// Delete finished job rows past their retention windows.
    /// Returns the number of rows removed.
    async fn cleanup_finished(&self) -> Result<i64>;
}
