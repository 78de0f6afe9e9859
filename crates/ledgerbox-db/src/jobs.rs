//! Job repository implementation.
//!
//! At-least-once delivery: claims use FOR UPDATE SKIP LOCKED so concurrent
//! workers never double-claim, and failures re-queue with exponential
//! backoff until the attempt budget runs out.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use ledgerbox_core::{
    defaults, Error, Job, JobRepository, JobStatus, JobType, QueueStats, Result,
};

/// PostgreSQL implementation of JobRepository.
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    /// Create a new PgJobRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Convert JobType to string for database.
    fn job_type_to_str(job_type: JobType) -> &'static str {
        match job_type {
            JobType::ProcessAttachment => "process_attachment",
            JobType::ExtractInvoice => "extract_invoice",
            JobType::ExtractReceipt => "extract_receipt",
        }
    }

    /// Convert string from database to JobType.
    fn str_to_job_type(s: &str) -> JobType {
        match s {
            "process_attachment" => JobType::ProcessAttachment,
            "extract_invoice" => JobType::ExtractInvoice,
            "extract_receipt" => JobType::ExtractReceipt,
            _ => JobType::ProcessAttachment, // fallback
        }
    }

    /// Convert string from database to JobStatus.
    fn str_to_job_status(s: &str) -> JobStatus {
        match s {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            _ => JobStatus::Pending, // fallback
        }
    }

    /// Parse a job row into a Job struct.
    fn parse_job_row(row: sqlx::postgres::PgRow) -> Job {
        Job {
            id: row.get("id"),
            job_type: Self::str_to_job_type(row.get("job_type")),
            status: Self::str_to_job_status(row.get("status")),
            priority: row.get("priority"),
            payload: row.get("payload"),
            result: row.get("result"),
            error_message: row.get("error_message"),
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            run_after: row.get("run_after"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn queue(
        &self,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
        max_retries: i32,
    ) -> Result<Uuid> {
        let job_id = Uuid::now_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO job_queue (id, job_type, status, priority, payload, max_retries, created_at)
             VALUES ($1, $2, 'pending', $3, $4, $5, $6)",
        )
        .bind(job_id)
        .bind(Self::job_type_to_str(job_type))
        .bind(priority)
        .bind(&payload)
        .bind(max_retries)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(job_id)
    }

    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let now = Utc::now();
        let type_strings: Vec<String> = job_types
            .iter()
            .map(|jt| Self::job_type_to_str(*jt).to_string())
            .collect();

        // FOR UPDATE SKIP LOCKED for concurrent workers. Filter by type and
        // backoff gate BEFORE locking. Empty array = claim any type.
        let row = sqlx::query(
            "UPDATE job_queue
             SET status = 'running', started_at = $1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE status = 'pending'
                   AND (run_after IS NULL OR run_after <= $1)
                   AND (cardinality($2::text[]) = 0 OR job_type = ANY($2))
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, job_type, status, priority, payload, result, error_message,
                       retry_count, max_retries, run_after, created_at, started_at, completed_at",
        )
        .bind(now)
        .bind(&type_strings)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue
             SET status = 'completed', completed_at = $1, result = $2
             WHERE id = $3",
        )
        .bind(Utc::now())
        .bind(&result)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let (retry_count, max_retries): (i32, i32) =
            sqlx::query_as("SELECT retry_count, max_retries FROM job_queue WHERE id = $1")
                .bind(job_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(Error::Database)?;

        if retry_count < max_retries {
            // Retry: back to pending, claimable after an exponential delay
            // (1s, 2s, 4s, ... from the base).
            let delay_secs = defaults::JOB_BACKOFF_BASE_SECS << retry_count.min(16);
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'pending', retry_count = $1, error_message = $2,
                     started_at = NULL, run_after = $3
                 WHERE id = $4",
            )
            .bind(retry_count + 1)
            .bind(error)
            .bind(now + chrono::Duration::seconds(delay_secs))
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        } else {
            // Attempt budget exhausted: terminal failure.
            sqlx::query(
                "UPDATE job_queue
                 SET status = 'failed', completed_at = $1, error_message = $2
                 WHERE id = $3",
            )
            .bind(now)
            .bind(error)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn cancel(&self, job_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE job_queue
             SET status = 'cancelled', completed_at = $1
             WHERE id = $2 AND status = 'pending'",
        )
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(
            "SELECT id, job_type, status, priority, payload, result, error_message,
                    retry_count, max_retries, run_after, created_at, started_at, completed_at
             FROM job_queue WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM job_queue WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(count)
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'running') AS processing,
                COUNT(*) FILTER (WHERE status = 'completed' AND completed_at > NOW() - INTERVAL '1 hour') AS completed_last_hour,
                COUNT(*) FILTER (WHERE status = 'failed' AND completed_at > NOW() - INTERVAL '1 hour') AS failed_last_hour,
                COUNT(*) AS total
             FROM job_queue",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.get::<i64, _>("pending"),
            processing: row.get::<i64, _>("processing"),
            completed_last_hour: row.get::<i64, _>("completed_last_hour"),
            failed_last_hour: row.get::<i64, _>("failed_last_hour"),
            total: row.get::<i64, _>("total"),
        })
    }

    async fn cleanup_finished(&self) -> Result<i64> {
        let result = sqlx::query(
            "DELETE FROM job_queue
             WHERE (status = 'completed'
                    AND completed_at < NOW() - ($1 || ' hours')::interval)
                OR (status IN ('failed', 'cancelled')
                    AND completed_at < NOW() - ($2 || ' days')::interval)",
        )
        .bind(defaults::JOB_RETENTION_COMPLETED_HOURS)
        .bind(defaults::JOB_RETENTION_FAILED_DAYS)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_round_trip() {
        for job_type in [
            JobType::ProcessAttachment,
            JobType::ExtractInvoice,
            JobType::ExtractReceipt,
        ] {
            let s = PgJobRepository::job_type_to_str(job_type);
            assert_eq!(PgJobRepository::str_to_job_type(s), job_type);
        }
    }

    #[test]
    fn test_str_to_job_type_unknown_fallback() {
        assert_eq!(
            PgJobRepository::str_to_job_type("unknown_type"),
            JobType::ProcessAttachment
        );
    }

    #[test]
    fn test_str_to_job_status_all_variants() {
        assert_eq!(
            PgJobRepository::str_to_job_status("pending"),
            JobStatus::Pending
        );
        assert_eq!(
            PgJobRepository::str_to_job_status("running"),
            JobStatus::Running
        );
        assert_eq!(
            PgJobRepository::str_to_job_status("completed"),
            JobStatus::Completed
        );
        assert_eq!(
            PgJobRepository::str_to_job_status("failed"),
            JobStatus::Failed
        );
        assert_eq!(
            PgJobRepository::str_to_job_status("cancelled"),
            JobStatus::Cancelled
        );
        assert_eq!(PgJobRepository::str_to_job_status(""), JobStatus::Pending);
    }

    #[test]
    fn test_job_type_strings_are_unique() {
        let types = [
            JobType::ProcessAttachment,
            JobType::ExtractInvoice,
            JobType::ExtractReceipt,
        ];
        let strings: Vec<&str> = types
            .iter()
            .map(|t| PgJobRepository::job_type_to_str(*t))
            .collect();
        let mut unique = strings.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(strings.len(), unique.len());
    }

    #[test]
    fn test_backoff_is_exponential() {
        // Mirrors the shift in `fail`: 1s, 2s, 4s for the default base.
        let delays: Vec<i64> = (0..3)
            .map(|retry_count: i32| defaults::JOB_BACKOFF_BASE_SECS << retry_count.min(16))
            .collect();
        assert_eq!(delays, vec![1, 2, 4]);
    }
}
