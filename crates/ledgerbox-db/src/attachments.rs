//! Attachment repository.
//!
//! The attachment row is the single source of truth for pipeline progress.
//! Status writes are guarded by the transition table at the SQL level:
//! an UPDATE only matches when the current status is a valid predecessor
//! (or already the target, so redelivered jobs are no-ops), and a zero-row
//! result surfaces as `Error::InvalidTransition`.

use std::collections::HashMap;
use std::str::FromStr;

use sqlx::{PgPool, Row};
use uuid::Uuid;

use ledgerbox_core::{
    Attachment, AttachmentFilter, AttachmentManifestEntry, AttachmentPage, AttachmentStats,
    AttachmentStatus, DocumentType, Email, Error, ExtractionState, Provider, Result, ScanVerdict,
    StorageKind,
};

const ATTACHMENT_COLUMNS: &str = r#"id, email_id, external_id, org_id, user_id, provider,
       filename, original_filename, mime_type, size_bytes, extension, content_hash,
       storage_backend, storage_path, storage_url, bucket, object_key,
       status, processing_error, retry_count,
       classified_type, classification_confidence, classified_at,
       is_scanned, scan_result, scan_provider, scanned_at,
       extracted_data_id, extraction_status, extraction_error, extracted_at,
       processed_at, created_at, updated_at, deleted_at"#;

/// Storage descriptor persisted onto the attachment once bytes are placed.
#[derive(Debug, Clone)]
pub struct StoredDescriptor {
    pub backend: StorageKind,
    pub path: String,
    pub url: Option<String>,
    pub bucket: Option<String>,
    pub object_key: Option<String>,
    pub content_hash: String,
    pub size_bytes: i64,
}

/// PostgreSQL implementation of the attachment repository.
pub struct PgAttachmentRepository {
    pool: PgPool,
}

impl PgAttachmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create or refresh the record for a discovered attachment.
    ///
    /// Keyed on (email_id, external_id): re-discovery updates file metadata
    /// on the existing row and never duplicates it or resets its status.
    pub async fn upsert_discovered(
        &self,
        email: &Email,
        entry: &AttachmentManifestEntry,
    ) -> Result<Attachment> {
        let id = Uuid::now_v7();
        let extension = ledgerbox_core::file_extension(&entry.filename);

        let row = sqlx::query(&format!(
            r#"INSERT INTO attachment
               (id, email_id, external_id, org_id, user_id, provider,
                filename, original_filename, mime_type, size_bytes, extension, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8, $9, $10, 'pending')
               ON CONFLICT (email_id, external_id) DO UPDATE
               SET filename = EXCLUDED.filename,
                   mime_type = EXCLUDED.mime_type,
                   size_bytes = EXCLUDED.size_bytes,
                   extension = EXCLUDED.extension,
                   updated_at = NOW()
               RETURNING {ATTACHMENT_COLUMNS}"#
        ))
        .bind(id)
        .bind(email.id)
        .bind(&entry.external_id)
        .bind(email.org_id)
        .bind(email.user_id)
        .bind(email.provider.to_string())
        .bind(&entry.filename)
        .bind(&entry.mime_type)
        .bind(entry.size_bytes)
        .bind(extension)
        .fetch_one(&self.pool)
        .await?;

        attachment_from_row(&row)
    }

    /// Get attachment by ID.
    pub async fn get(&self, attachment_id: Uuid) -> Result<Attachment> {
        let row = sqlx::query(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachment WHERE id = $1"
        ))
        .bind(attachment_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Attachment {} not found", attachment_id)))?;

        attachment_from_row(&row)
    }

    /// Advance the attachment to `to`, validated against the transition
    /// table at write time.
    ///
    /// Idempotent under redelivery: a row already at `to`, or already past
    /// it on the forward path, is left untouched. A genuinely invalid
    /// transition is rejected with the actual current status in the error.
    pub async fn advance_status(&self, attachment_id: Uuid, to: AttachmentStatus) -> Result<()> {
        let predecessors: Vec<String> = to
            .valid_predecessors()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let result = sqlx::query(
            r#"UPDATE attachment
               SET status = $2, updated_at = NOW()
               WHERE id = $1 AND status = ANY($3)"#,
        )
        .bind(attachment_id)
        .bind(to.to_string())
        .bind(&predecessors)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.get(attachment_id).await?;
            if current.status.is_at_or_beyond(to) {
                return Ok(());
            }
            return Err(Error::InvalidTransition {
                from: current.status,
                to,
            });
        }
        Ok(())
    }

    /// Record a processing failure: terminal FAILED status, the error
    /// message, and a bumped retry counter.
    ///
    /// Already-terminal rows are left untouched so a late failure from a
    /// redelivered job cannot clobber a completed record.
    pub async fn mark_failed(&self, attachment_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"UPDATE attachment
               SET status = 'failed', processing_error = $2,
                   retry_count = retry_count + 1, updated_at = NOW()
               WHERE id = $1 AND status NOT IN ('completed', 'failed', 'quarantined')"#,
        )
        .bind(attachment_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark the attachment COMPLETED with a processing timestamp.
    pub async fn mark_completed(&self, attachment_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE attachment
               SET status = 'completed', processed_at = NOW(), updated_at = NOW()
               WHERE id = $1 AND status IN ('classified', 'extracting', 'completed')"#,
        )
        .bind(attachment_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.get(attachment_id).await?;
            return Err(Error::InvalidTransition {
                from: current.status,
                to: AttachmentStatus::Completed,
            });
        }
        Ok(())
    }

    /// Persist the storage descriptor, exactly once.
    ///
    /// Guarded on `content_hash IS NULL`: returns `true` only for the write
    /// that actually set the descriptor. Redelivered jobs see `false` and
    /// must not count quota usage again.
    pub async fn record_stored(
        &self,
        attachment_id: Uuid,
        descriptor: &StoredDescriptor,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE attachment
               SET storage_backend = $2, storage_path = $3, storage_url = $4,
                   bucket = $5, object_key = $6, content_hash = $7,
                   size_bytes = $8, updated_at = NOW()
               WHERE id = $1 AND content_hash IS NULL"#,
        )
        .bind(attachment_id)
        .bind(descriptor.backend.to_string())
        .bind(&descriptor.path)
        .bind(&descriptor.url)
        .bind(&descriptor.bucket)
        .bind(&descriptor.object_key)
        .bind(&descriptor.content_hash)
        .bind(descriptor.size_bytes)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Persist a scan outcome.
    pub async fn record_scan(
        &self,
        attachment_id: Uuid,
        verdict: ScanVerdict,
        scan_provider: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE attachment
               SET is_scanned = TRUE, scan_result = $2, scan_provider = $3,
                   scanned_at = NOW(), updated_at = NOW()
               WHERE id = $1"#,
        )
        .bind(attachment_id)
        .bind(verdict.to_string())
        .bind(scan_provider)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a classification outcome.
    pub async fn record_classification(
        &self,
        attachment_id: Uuid,
        doc_type: DocumentType,
        confidence: f32,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE attachment
               SET classified_type = $2, classification_confidence = $3,
                   classified_at = NOW(), updated_at = NOW()
               WHERE id = $1"#,
        )
        .bind(attachment_id)
        .bind(doc_type.to_string())
        .bind(confidence)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update the extraction sub-status without touching the attachment's
    /// own lifecycle status.
    pub async fn set_extraction_state(
        &self,
        attachment_id: Uuid,
        state: ExtractionState,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE attachment
               SET extraction_status = $2, extraction_error = $3, updated_at = NOW()
               WHERE id = $1"#,
        )
        .bind(attachment_id)
        .bind(state.to_string())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reset a terminal attachment back to PENDING for an explicit retry or
    /// forced reprocess. Returns false if the row was not in a resettable
    /// state.
    pub async fn reset_for_retry(&self, attachment_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE attachment
               SET status = 'pending', processing_error = NULL, updated_at = NOW()
               WHERE id = $1 AND status IN ('failed', 'completed')"#,
        )
        .bind(attachment_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List attachments for a tenant with optional filters, paginated.
    pub async fn list(
        &self,
        org_id: Uuid,
        filter: &AttachmentFilter,
        page: i64,
        limit: i64,
    ) -> Result<AttachmentPage> {
        let page = page.max(1);
        let limit = limit.clamp(1, ledgerbox_core::defaults::PAGE_LIMIT_MAX);
        let offset = (page - 1) * limit;

        let mut conditions = vec![
            "org_id = $1".to_string(),
            "deleted_at IS NULL".to_string(),
        ];
        let mut param_idx = 2;

        if filter.email_id.is_some() {
            conditions.push(format!("email_id = ${}", param_idx));
            param_idx += 1;
        }
        if filter.status.is_some() {
            conditions.push(format!("status = ${}", param_idx));
            param_idx += 1;
        }
        if filter.document_type.is_some() {
            conditions.push(format!("classified_type = ${}", param_idx));
            param_idx += 1;
        }

        let where_clause = conditions.join(" AND ");

        let count_query = format!("SELECT COUNT(*) FROM attachment WHERE {}", where_clause);
        let list_query = format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachment WHERE {}
             ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            where_clause,
            param_idx,
            param_idx + 1
        );

        let mut count_q = sqlx::query_scalar::<_, i64>(&count_query).bind(org_id);
        let mut list_q = sqlx::query(&list_query).bind(org_id);

        if let Some(email_id) = filter.email_id {
            count_q = count_q.bind(email_id);
            list_q = list_q.bind(email_id);
        }
        if let Some(status) = filter.status {
            count_q = count_q.bind(status.to_string());
            list_q = list_q.bind(status.to_string());
        }
        if let Some(doc_type) = filter.document_type {
            count_q = count_q.bind(doc_type.to_string());
            list_q = list_q.bind(doc_type.to_string());
        }

        let total = count_q.fetch_one(&self.pool).await?;
        let rows = list_q.bind(limit).bind(offset).fetch_all(&self.pool).await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(attachment_from_row(row)?);
        }

        Ok(AttachmentPage {
            items,
            total,
            page,
            limit,
        })
    }

    /// FAILED attachments still below the retry bound, optionally scoped to
    /// one email.
    pub async fn list_failed(
        &self,
        org_id: Uuid,
        email_id: Option<Uuid>,
        max_retries: i32,
    ) -> Result<Vec<Attachment>> {
        let rows = if let Some(email_id) = email_id {
            sqlx::query(&format!(
                "SELECT {ATTACHMENT_COLUMNS} FROM attachment
                 WHERE org_id = $1 AND email_id = $2 AND status = 'failed'
                   AND retry_count < $3 AND deleted_at IS NULL
                 ORDER BY created_at"
            ))
            .bind(org_id)
            .bind(email_id)
            .bind(max_retries)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                "SELECT {ATTACHMENT_COLUMNS} FROM attachment
                 WHERE org_id = $1 AND status = 'failed'
                   AND retry_count < $2 AND deleted_at IS NULL
                 ORDER BY created_at"
            ))
            .bind(org_id)
            .bind(max_retries)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(attachment_from_row).collect()
    }

    /// Soft-delete: hide the row from listings, keep it for audit.
    pub async fn soft_delete(&self, attachment_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE attachment SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(attachment_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "Attachment {} not found",
                attachment_id
            )));
        }
        Ok(())
    }

    /// Hard-delete the row.
    pub async fn hard_delete(&self, attachment_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM attachment WHERE id = $1")
            .bind(attachment_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "Attachment {} not found",
                attachment_id
            )));
        }
        Ok(())
    }

    /// Per-tenant statistics: counts by status, bytes, and per-type counts.
    pub async fn stats(&self, org_id: Uuid) -> Result<AttachmentStats> {
        let row = sqlx::query(
            r#"SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'quarantined') AS quarantined,
                COALESCE(SUM(size_bytes), 0) AS total_bytes
               FROM attachment
               WHERE org_id = $1 AND deleted_at IS NULL"#,
        )
        .bind(org_id)
        .fetch_one(&self.pool)
        .await?;

        let type_rows = sqlx::query(
            r#"SELECT classified_type, COUNT(*) AS count
               FROM attachment
               WHERE org_id = $1 AND classified_type IS NOT NULL AND deleted_at IS NULL
               GROUP BY classified_type"#,
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        let mut by_type = HashMap::new();
        for type_row in type_rows {
            let doc_type: String = type_row.get("classified_type");
            let count: i64 = type_row.get("count");
            by_type.insert(doc_type, count);
        }

        Ok(AttachmentStats {
            total: row.get("total"),
            completed: row.get("completed"),
            failed: row.get("failed"),
            pending: row.get("pending"),
            quarantined: row.get("quarantined"),
            total_bytes: row.get("total_bytes"),
            by_type,
        })
    }
}

/// Parse attachment status from the database, falling back to pending.
fn parse_status(s: &str) -> AttachmentStatus {
    AttachmentStatus::from_str(s).unwrap_or_default()
}

/// Convert a database row to an Attachment.
fn attachment_from_row(row: &sqlx::postgres::PgRow) -> Result<Attachment> {
    let provider_str: String = row.get("provider");
    let provider = Provider::from_str(&provider_str).map_err(Error::InvalidInput)?;

    let storage_backend = row
        .get::<Option<String>, _>("storage_backend")
        .and_then(|s| StorageKind::from_str(&s).ok());
    let classified_type = row
        .get::<Option<String>, _>("classified_type")
        .and_then(|s| DocumentType::from_str(&s).ok());
    let scan_result = row
        .get::<Option<String>, _>("scan_result")
        .and_then(|s| ScanVerdict::from_str(&s).ok());
    let extraction_status = row
        .get::<Option<String>, _>("extraction_status")
        .and_then(|s| ExtractionState::from_str(&s).ok());

    Ok(Attachment {
        id: row.get("id"),
        email_id: row.get("email_id"),
        external_id: row.get("external_id"),
        org_id: row.get("org_id"),
        user_id: row.get("user_id"),
        provider,
        filename: row.get("filename"),
        original_filename: row.get("original_filename"),
        mime_type: row.get("mime_type"),
        size_bytes: row.get("size_bytes"),
        extension: row.get("extension"),
        content_hash: row.get("content_hash"),
        storage_backend,
        storage_path: row.get("storage_path"),
        storage_url: row.get("storage_url"),
        bucket: row.get("bucket"),
        object_key: row.get("object_key"),
        status: parse_status(row.get("status")),
        processing_error: row.get("processing_error"),
        retry_count: row.get("retry_count"),
        classified_type,
        classification_confidence: row.get("classification_confidence"),
        classified_at: row.get("classified_at"),
        is_scanned: row.get("is_scanned"),
        scan_result,
        scan_provider: row.get("scan_provider"),
        scanned_at: row.get("scanned_at"),
        extracted_data_id: row.get("extracted_data_id"),
        extraction_status,
        extraction_error: row.get("extraction_error"),
        extracted_at: row.get("extracted_at"),
        processed_at: row.get("processed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        deleted_at: row.get("deleted_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_fallback() {
        assert_eq!(parse_status("downloading"), AttachmentStatus::Downloading);
        assert_eq!(parse_status("garbage"), AttachmentStatus::Pending);
    }

    #[test]
    fn test_stored_descriptor_clone() {
        let descriptor = StoredDescriptor {
            backend: StorageKind::Local,
            path: "org/1-a.pdf".to_string(),
            url: None,
            bucket: None,
            object_key: None,
            content_hash: "deadbeef".to_string(),
            size_bytes: 42,
        };
        let copy = descriptor.clone();
        assert_eq!(copy.path, descriptor.path);
        assert_eq!(copy.size_bytes, 42);
    }
}
