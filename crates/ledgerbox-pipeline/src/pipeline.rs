//! Attachment processing orchestrator.
//!
//! Drives one attachment through download → store → scan → classify →
//! route, persisting every status transition through the validated
//! transition table. Jobs are delivered at least once, so each
//! side-effecting step is guarded by a fact already recorded on the
//! attachment row (content hash for quota, scan timestamp for scanning,
//! classification timestamp for the category bucket).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use ledgerbox_core::{
    classify, defaults, extractor_route, should_extract, Attachment, AttachmentFilter,
    AttachmentJobPayload, AttachmentPage, AttachmentStats, AttachmentStatus, BatchQueued,
    DeleteOptions, DownloadOptions, DownloadResult, Email, Error, ExtractionJobPayload,
    ExtractionOptions, ExtractionState, JobRepository, JobType, ProcessOptions, QuotaSettings,
    Result, RetryOptions, ScanVerdict, StorageQuota,
};
use ledgerbox_db::{Database, StoredDescriptor};
use ledgerbox_storage::ObjectStore;

use crate::provider::{FetchRequest, ProviderFetch};
use crate::scan::VirusScanner;

/// The stateful coordinator for attachment ingest.
#[derive(Clone)]
pub struct AttachmentPipeline {
    db: Database,
    store: ObjectStore,
    provider: Arc<dyn ProviderFetch>,
    scanner: Arc<dyn VirusScanner>,
}

impl AttachmentPipeline {
    pub fn new(
        db: Database,
        store: ObjectStore,
        provider: Arc<dyn ProviderFetch>,
        scanner: Arc<dyn VirusScanner>,
    ) -> Self {
        Self {
            db,
            store,
            provider,
            scanner,
        }
    }

    /// Queue processing jobs for every attachment of an email.
    ///
    /// Quota exhaustion fails the whole batch before anything is queued.
    /// Records are upserted idempotently on (email_id, external_id);
    /// completed ones are reused unless `force_reprocess` is set.
    #[instrument(skip(self), fields(org_id = %org_id, email_id = %email_id))]
    pub async fn process_email_attachments(
        &self,
        email_id: Uuid,
        org_id: Uuid,
        user_id: Uuid,
        options: ProcessOptions,
    ) -> Result<BatchQueued> {
        let email = self
            .db
            .emails
            .get(email_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Email {} not found", email_id)))?;

        if email.org_id != org_id {
            return Err(Error::AccessDenied(format!(
                "Email {} does not belong to org {}",
                email_id, org_id
            )));
        }

        if email.attachments.is_empty() {
            return Ok(BatchQueued {
                queued_count: 0,
                job_ids: Vec::new(),
            });
        }

        self.db.quotas.check(org_id).await?;

        let mut job_ids = Vec::new();
        for entry in &email.attachments {
            let attachment = self.db.attachments.upsert_discovered(&email, entry).await?;

            match attachment.status {
                AttachmentStatus::Completed if !options.force_reprocess => {
                    // Already processed; reuse the record.
                    continue;
                }
                AttachmentStatus::Quarantined => {
                    // The scan verdict stands; quarantined content is never
                    // silently resurrected.
                    continue;
                }
                AttachmentStatus::Completed => {
                    self.db.attachments.reset_for_retry(attachment.id).await?;
                }
                _ => {}
            }

            let job_id = self
                .enqueue_processing_job(&email, &attachment, options.skip_scanning)
                .await?;
            job_ids.push(job_id);
        }

        info!(queued = job_ids.len(), "queued attachment processing batch");

        Ok(BatchQueued {
            queued_count: job_ids.len(),
            job_ids,
        })
    }

    async fn enqueue_processing_job(
        &self,
        email: &Email,
        attachment: &Attachment,
        skip_scanning: bool,
    ) -> Result<Uuid> {
        let payload = AttachmentJobPayload {
            attachment_id: attachment.id,
            email_id: email.id,
            connection_id: email.connection_id,
            provider: attachment.provider,
            external_id: attachment.external_id.clone(),
            org_id: attachment.org_id,
            user_id: attachment.user_id,
            skip_scanning,
        };

        self.db
            .jobs
            .queue(
                JobType::ProcessAttachment,
                JobType::ProcessAttachment.default_priority(),
                Some(serde_json::to_value(&payload)?),
                defaults::JOB_MAX_RETRIES,
            )
            .await
    }

    /// Worker body: run one attachment through the full pipeline.
    ///
    /// Any failure is recorded on the attachment (FAILED status, message,
    /// retry counter) and re-raised so the queue's retry policy can
    /// redeliver.
    #[instrument(skip(self, payload), fields(attachment_id = %payload.attachment_id))]
    pub async fn process_single(&self, payload: &AttachmentJobPayload) -> Result<()> {
        let start = Instant::now();
        let result = self.run_pipeline(payload).await;

        match &result {
            Ok(()) => {
                info!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    "attachment processed"
                );
            }
            Err(e) => {
                warn!(error = %e, "attachment processing failed");
                if let Err(mark_err) = self
                    .db
                    .attachments
                    .mark_failed(payload.attachment_id, &e.to_string())
                    .await
                {
                    warn!(error = %mark_err, "failed to record attachment failure");
                }
            }
        }

        result
    }

    async fn run_pipeline(&self, payload: &AttachmentJobPayload) -> Result<()> {
        let mut attachment = self.db.attachments.get(payload.attachment_id).await?;

        if attachment.org_id != payload.org_id {
            return Err(Error::AccessDenied(format!(
                "Attachment {} does not belong to org {}",
                attachment.id, payload.org_id
            )));
        }

        // Redelivery handling: completed and quarantined records are final
        // for this job; a failed record is being retried by the queue.
        match attachment.status {
            AttachmentStatus::Completed | AttachmentStatus::Quarantined => return Ok(()),
            AttachmentStatus::Failed => {
                self.db.attachments.reset_for_retry(attachment.id).await?;
                attachment = self.db.attachments.get(attachment.id).await?;
            }
            _ => {}
        }

        // ── Download & store ────────────────────────────────────────────
        let data = if attachment.content_hash.is_none() {
            self.download_and_store(payload, &attachment).await?
        } else {
            // A previous delivery (or run, for a forced reprocess) already
            // stored the bytes; re-read them instead of fetching from the
            // provider, and walk the record forward. The advances are
            // no-ops for records already past these states.
            let path = attachment
                .storage_path
                .clone()
                .ok_or_else(|| Error::Internal("content hash set without storage path".into()))?;
            let data = self.store.get(&path).await?;
            self.db
                .attachments
                .advance_status(attachment.id, AttachmentStatus::Downloading)
                .await?;
            self.db
                .attachments
                .advance_status(attachment.id, AttachmentStatus::Downloaded)
                .await?;
            data
        };
        attachment = self.db.attachments.get(attachment.id).await?;

        // Providers occasionally mislabel content; classification keys off
        // the MIME type, so correct it from magic bytes first.
        let mime_type = ledgerbox_core::detect_content_type(&data, &attachment.mime_type);

        // ── Scan ────────────────────────────────────────────────────────
        if !payload.skip_scanning && !attachment.is_scanned {
            self.db
                .attachments
                .advance_status(attachment.id, AttachmentStatus::Scanning)
                .await?;

            let outcome = self.scanner.scan(&data).await?;
            self.db
                .attachments
                .record_scan(attachment.id, outcome.verdict, &outcome.provider)
                .await?;

            if outcome.verdict != ScanVerdict::Clean {
                warn!(
                    attachment_id = %attachment.id,
                    verdict = %outcome.verdict,
                    scanner = %outcome.provider,
                    "attachment quarantined"
                );
                self.db
                    .attachments
                    .advance_status(attachment.id, AttachmentStatus::Quarantined)
                    .await?;
                return Ok(());
            }
        }

        // ── Classify ────────────────────────────────────────────────────
        self.db
            .attachments
            .advance_status(attachment.id, AttachmentStatus::Classifying)
            .await?;

        let email = self.db.emails.get(attachment.email_id).await?;
        let subject = email.as_ref().and_then(|e| e.subject.as_deref());

        let newly_classified = attachment.classified_at.is_none();
        let classification = if newly_classified {
            let classification = classify(&attachment.filename, &mime_type, subject);
            self.db
                .attachments
                .record_classification(attachment.id, classification.doc_type, classification.confidence)
                .await?;
            // The bytes were counted against the tenant total at store
            // time; only the category bucket moves here.
            self.db
                .quotas
                .apply_category_delta(
                    attachment.org_id,
                    classification.doc_type.quota_category(),
                    data.len() as i64,
                )
                .await?;
            classification
        } else {
            // Redelivered past classification: reuse the recorded outcome.
            ledgerbox_core::Classification {
                doc_type: attachment.classified_type.unwrap_or(ledgerbox_core::DocumentType::Other),
                confidence: attachment.classification_confidence.unwrap_or(0.0),
            }
        };

        self.db
            .attachments
            .advance_status(attachment.id, AttachmentStatus::Classified)
            .await?;

        info!(
            attachment_id = %attachment.id,
            doc_type = %classification.doc_type,
            confidence = classification.confidence,
            "attachment classified"
        );

        // ── Route or complete ───────────────────────────────────────────
        let route = extractor_route(classification.doc_type);
        if should_extract(classification.doc_type, classification.confidence) {
            if let Some(queue) = route {
                self.db
                    .attachments
                    .advance_status(attachment.id, AttachmentStatus::Extracting)
                    .await?;
                if attachment.extraction_status == Some(ExtractionState::Pending) {
                    // A previous delivery already routed this attachment.
                    return Ok(());
                }
                return self
                    .route_extraction(&attachment, &mime_type, queue)
                    .await;
            }
        }

        self.db.attachments.mark_completed(attachment.id).await?;
        Ok(())
    }

    /// Fetch bytes from the provider, place them in storage, and account
    /// the quota usage at most once.
    async fn download_and_store(
        &self,
        payload: &AttachmentJobPayload,
        attachment: &Attachment,
    ) -> Result<Vec<u8>> {
        self.db
            .attachments
            .advance_status(attachment.id, AttachmentStatus::Downloading)
            .await?;

        let request = FetchRequest {
            provider: payload.provider,
            connection_id: payload.connection_id,
            external_id: payload.external_id.clone(),
            email_id: payload.email_id,
            org_id: payload.org_id,
            user_id: payload.user_id,
        };
        let data = self.provider.fetch(&request).await?;

        self.db
            .attachments
            .advance_status(attachment.id, AttachmentStatus::Downloaded)
            .await?;

        let mime_type = ledgerbox_core::detect_content_type(&data, &attachment.mime_type);
        let stored = self
            .store
            .put(attachment.org_id, &attachment.filename, &mime_type, &data)
            .await?;

        let descriptor = StoredDescriptor {
            backend: stored.backend,
            path: stored.path,
            url: stored.url,
            bucket: stored.bucket,
            object_key: stored.object_key,
            content_hash: stored.content_hash,
            size_bytes: stored.size_bytes,
        };

        // First writer wins: the hash latch makes redelivered jobs skip the
        // usage increment.
        let first_store = self
            .db
            .attachments
            .record_stored(attachment.id, &descriptor)
            .await?;
        if first_store {
            self.db
                .quotas
                .apply_usage_delta(attachment.org_id, descriptor.size_bytes)
                .await?;
        } else {
            // Another delivery already owns the descriptor; drop the extra
            // copy we just wrote.
            self.store.remove(&descriptor.path).await;
        }

        Ok(data)
    }

    /// Enqueue the extraction job. Failures here downgrade only the
    /// extraction sub-status; the stored, classified attachment remains
    /// usable and is completed.
    async fn route_extraction(
        &self,
        attachment: &Attachment,
        mime_type: &str,
        queue: JobType,
    ) -> Result<()> {
        let result = self.try_enqueue_extraction(attachment, mime_type, queue).await;

        match result {
            Ok(job_id) => {
                self.db
                    .attachments
                    .set_extraction_state(attachment.id, ExtractionState::Pending, None)
                    .await?;
                info!(
                    attachment_id = %attachment.id,
                    job_id = %job_id,
                    job_type = ?queue,
                    "extraction job queued"
                );
            }
            Err(e) => {
                warn!(
                    attachment_id = %attachment.id,
                    error = %e,
                    "extraction routing failed"
                );
                self.db
                    .attachments
                    .set_extraction_state(attachment.id, ExtractionState::Failed, Some(&e.to_string()))
                    .await?;
                self.db.attachments.mark_completed(attachment.id).await?;
            }
        }

        Ok(())
    }

    async fn try_enqueue_extraction(
        &self,
        attachment: &Attachment,
        mime_type: &str,
        queue: JobType,
    ) -> Result<Uuid> {
        // Verify the stored artifact is actually retrievable before handing
        // a reference to it downstream.
        let path = attachment
            .storage_path
            .as_deref()
            .ok_or_else(|| Error::Internal("routing an attachment with no stored content".into()))?;
        if !self.store.exists(path).await? {
            return Err(Error::Storage(format!(
                "stored content missing at {}",
                path
            )));
        }

        let payload = ExtractionJobPayload {
            attachment_id: attachment.id,
            org_id: attachment.org_id,
            user_id: attachment.user_id,
            mime_type: mime_type.to_string(),
            file_name: attachment.filename.clone(),
            options: ExtractionOptions::default(),
        };

        self.db
            .jobs
            .queue(
                queue,
                queue.default_priority(),
                Some(serde_json::to_value(&payload)?),
                payload.options.max_retries,
            )
            .await
    }

    // ─── Read & maintenance operations ──────────────────────────────────

    /// Fetch an attachment, enforcing tenant ownership.
    pub async fn get_attachment(&self, attachment_id: Uuid, org_id: Uuid) -> Result<Attachment> {
        let attachment = self.db.attachments.get(attachment_id).await?;
        if attachment.org_id != org_id {
            return Err(Error::AccessDenied(format!(
                "Attachment {} does not belong to org {}",
                attachment_id, org_id
            )));
        }
        Ok(attachment)
    }

    /// Download stored content, as bytes or as a presigned URL.
    ///
    /// `return_url` is only valid for object-storage-backed records; the
    /// local backend rejects it with a client error.
    pub async fn download_attachment(
        &self,
        attachment_id: Uuid,
        org_id: Uuid,
        options: DownloadOptions,
    ) -> Result<DownloadResult> {
        let attachment = self.get_attachment(attachment_id, org_id).await?;
        if attachment.deleted_at.is_some() {
            return Err(Error::NotFound(format!(
                "Attachment {} not found",
                attachment_id
            )));
        }

        let path = attachment.storage_path.as_deref().ok_or_else(|| {
            Error::InvalidInput(format!(
                "Attachment {} has no stored content yet",
                attachment_id
            ))
        })?;

        if options.return_url {
            let url = self.store.presign(path, options.expires_in_secs).await?;
            return Ok(DownloadResult::Url(url));
        }

        let data = self.store.get(path).await?;
        Ok(DownloadResult::Bytes {
            data,
            mime_type: attachment.mime_type,
            filename: attachment.filename,
        })
    }

    /// Delete an attachment, reversing its quota accounting.
    ///
    /// Bypasses the forward state machine entirely. With
    /// `delete_from_storage` the stored bytes are removed (best-effort) and
    /// the row is hard-deleted; otherwise the row is soft-deleted and the
    /// bytes retained.
    pub async fn delete_attachment(
        &self,
        attachment_id: Uuid,
        org_id: Uuid,
        options: DeleteOptions,
    ) -> Result<()> {
        let attachment = self.get_attachment(attachment_id, org_id).await?;

        if options.delete_from_storage {
            if let Some(path) = &attachment.storage_path {
                self.store.remove(path).await;
            }
            self.db.attachments.hard_delete(attachment_id).await?;
        } else {
            self.db.attachments.soft_delete(attachment_id).await?;
        }

        // Reverse the ledger only for content that was actually counted.
        if attachment.content_hash.is_some() {
            self.db
                .quotas
                .apply_usage_delta(org_id, -attachment.size_bytes)
                .await?;
            if let Some(doc_type) = attachment.classified_type {
                self.db
                    .quotas
                    .apply_category_delta(org_id, doc_type.quota_category(), -attachment.size_bytes)
                    .await?;
            }
        }

        info!(
            attachment_id = %attachment_id,
            org_id = %org_id,
            from_storage = options.delete_from_storage,
            "attachment deleted"
        );
        Ok(())
    }

    /// Re-queue FAILED attachments below the retry bound.
    pub async fn retry_failed(&self, org_id: Uuid, options: RetryOptions) -> Result<BatchQueued> {
        let max_retries = options.max_retries.unwrap_or(defaults::JOB_MAX_RETRIES);
        let failed = self
            .db
            .attachments
            .list_failed(org_id, options.email_id, max_retries)
            .await?;

        let mut emails: HashMap<Uuid, Email> = HashMap::new();
        let mut job_ids = Vec::new();

        for attachment in failed {
            let email = match emails.get(&attachment.email_id) {
                Some(email) => email.clone(),
                None => {
                    let Some(email) = self.db.emails.get(attachment.email_id).await? else {
                        warn!(
                            attachment_id = %attachment.id,
                            email_id = %attachment.email_id,
                            "skipping retry: email record is gone"
                        );
                        continue;
                    };
                    emails.insert(email.id, email.clone());
                    email
                }
            };

            if !self.db.attachments.reset_for_retry(attachment.id).await? {
                continue;
            }
            let job_id = self
                .enqueue_processing_job(&email, &attachment, false)
                .await?;
            job_ids.push(job_id);
        }

        info!(org_id = %org_id, requeued = job_ids.len(), "re-queued failed attachments");

        Ok(BatchQueued {
            queued_count: job_ids.len(),
            job_ids,
        })
    }

    /// List attachments for a tenant.
    pub async fn list_attachments(
        &self,
        org_id: Uuid,
        filter: AttachmentFilter,
        page: i64,
        limit: i64,
    ) -> Result<AttachmentPage> {
        self.db.attachments.list(org_id, &filter, page, limit).await
    }

    /// Tenant quota, lazily created on first access.
    pub async fn get_storage_quota(&self, org_id: Uuid) -> Result<StorageQuota> {
        self.db.quotas.get_or_create(org_id).await
    }

    /// Update tenant quota policy settings.
    pub async fn update_storage_quota(
        &self,
        org_id: Uuid,
        settings: QuotaSettings,
    ) -> Result<StorageQuota> {
        self.db.quotas.update_settings(org_id, &settings).await
    }

    /// Per-tenant processing statistics.
    pub async fn attachment_stats(&self, org_id: Uuid) -> Result<AttachmentStats> {
        self.db.attachments.stats(org_id).await
    }
}
