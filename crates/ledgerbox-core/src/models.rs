//! Core data model for the ledgerbox attachment pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// PROVIDERS
// =============================================================================

/// Upstream email provider an attachment originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gmail,
    Outlook,
    Xero,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gmail => write!(f, "gmail"),
            Self::Outlook => write!(f, "outlook"),
            Self::Xero => write!(f, "xero"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gmail" => Ok(Self::Gmail),
            "outlook" => Ok(Self::Outlook),
            "xero" => Ok(Self::Xero),
            _ => Err(format!("Unsupported provider: {}", s)),
        }
    }
}

// =============================================================================
// STORAGE
// =============================================================================

/// Which durable byte store holds an attachment's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    S3,
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::S3 => write!(f, "s3"),
        }
    }
}

impl std::str::FromStr for StorageKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}

// =============================================================================
// ATTACHMENT LIFECYCLE
// =============================================================================

/// Processing status for attachments.
///
/// The pipeline advances strictly forward through these states; the only
/// exits from a terminal state are the explicit retry/reprocess paths back
/// to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentStatus {
    #[default]
    Pending,
    Downloading,
    Downloaded,
    Scanning,
    Classifying,
    Classified,
    Extracting,
    Completed,
    Failed,
    Quarantined,
}

impl AttachmentStatus {
    /// Whether the pipeline does not automatically continue from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Quarantined)
    }

    /// Validated transition table.
    ///
    /// Regressions and skips are rejected; `Failed -> Pending` and
    /// `Completed -> Pending` exist only for the explicit retry and
    /// force-reprocess operations.
    pub fn can_transition_to(&self, to: AttachmentStatus) -> bool {
        use AttachmentStatus::*;
        // Any non-terminal state may fail.
        if to == Failed && !self.is_terminal() {
            return true;
        }
        matches!(
            (self, to),
            (Pending, Downloading)
                | (Downloading, Downloaded)
                | (Downloaded, Scanning)
                | (Downloaded, Classifying)
                | (Scanning, Classifying)
                | (Scanning, Quarantined)
                | (Classifying, Classified)
                | (Classified, Extracting)
                | (Classified, Completed)
                | (Extracting, Completed)
                | (Failed, Pending)
                | (Completed, Pending)
        )
    }

    /// Whether this status already covers `other` on the forward path.
    ///
    /// Used to make redelivered jobs no-ops: re-running a step against a
    /// record that already moved past it must neither regress the status
    /// nor fail the job. Failed is a branch and is never "beyond" anything;
    /// Quarantined sits past the scan stage only.
    pub fn is_at_or_beyond(&self, other: AttachmentStatus) -> bool {
        use AttachmentStatus::*;
        fn forward_rank(s: AttachmentStatus) -> Option<u8> {
            match s {
                Pending => Some(0),
                Downloading => Some(1),
                Downloaded => Some(2),
                Scanning => Some(3),
                Classifying => Some(4),
                Classified => Some(5),
                Extracting => Some(6),
                Completed => Some(7),
                Failed | Quarantined => None,
            }
        }
        if *self == other {
            return true;
        }
        match (forward_rank(*self), forward_rank(other)) {
            (Some(a), Some(b)) => a >= b,
            (None, Some(b)) => *self == Quarantined && b <= 3,
            _ => false,
        }
    }

    /// The states a forward transition into `self` is allowed from.
    ///
    /// Used by the repository to guard status UPDATEs at write time.
    pub fn valid_predecessors(&self) -> &'static [AttachmentStatus] {
        use AttachmentStatus::*;
        match self {
            Pending => &[Failed, Completed],
            Downloading => &[Pending],
            Downloaded => &[Downloading],
            Scanning => &[Downloaded],
            Classifying => &[Downloaded, Scanning],
            Classified => &[Classifying],
            Extracting => &[Classified],
            Completed => &[Classified, Extracting],
            Failed => &[
                Pending,
                Downloading,
                Downloaded,
                Scanning,
                Classifying,
                Classified,
                Extracting,
            ],
            Quarantined => &[Scanning],
        }
    }
}

impl std::fmt::Display for AttachmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Downloading => write!(f, "downloading"),
            Self::Downloaded => write!(f, "downloaded"),
            Self::Scanning => write!(f, "scanning"),
            Self::Classifying => write!(f, "classifying"),
            Self::Classified => write!(f, "classified"),
            Self::Extracting => write!(f, "extracting"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Quarantined => write!(f, "quarantined"),
        }
    }
}

impl std::str::FromStr for AttachmentStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "downloading" => Ok(Self::Downloading),
            "downloaded" => Ok(Self::Downloaded),
            "scanning" => Ok(Self::Scanning),
            "classifying" => Ok(Self::Classifying),
            "classified" => Ok(Self::Classified),
            "extracting" => Ok(Self::Extracting),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "quarantined" => Ok(Self::Quarantined),
            _ => Err(format!("Invalid attachment status: {}", s)),
        }
    }
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Financial document type assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    Receipt,
    Statement,
    Contract,
    Quote,
    DeliveryNote,
    PaymentProof,
    TaxDocument,
    Other,
    NonFinancial,
}

impl DocumentType {
    /// Quota accounting bucket this document type belongs to.
    ///
    /// Categories are mutually exclusive per attachment; everything that is
    /// not an invoice, receipt, or statement lands in the `Other` bucket.
    pub fn quota_category(&self) -> QuotaCategory {
        match self {
            Self::Invoice => QuotaCategory::Invoice,
            Self::Receipt => QuotaCategory::Receipt,
            Self::Statement => QuotaCategory::Statement,
            _ => QuotaCategory::Other,
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invoice => write!(f, "invoice"),
            Self::Receipt => write!(f, "receipt"),
            Self::Statement => write!(f, "statement"),
            Self::Contract => write!(f, "contract"),
            Self::Quote => write!(f, "quote"),
            Self::DeliveryNote => write!(f, "delivery_note"),
            Self::PaymentProof => write!(f, "payment_proof"),
            Self::TaxDocument => write!(f, "tax_document"),
            Self::Other => write!(f, "other"),
            Self::NonFinancial => write!(f, "non_financial"),
        }
    }
}

impl std::str::FromStr for DocumentType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "invoice" => Ok(Self::Invoice),
            "receipt" => Ok(Self::Receipt),
            "statement" => Ok(Self::Statement),
            "contract" => Ok(Self::Contract),
            "quote" => Ok(Self::Quote),
            "delivery_note" => Ok(Self::DeliveryNote),
            "payment_proof" => Ok(Self::PaymentProof),
            "tax_document" => Ok(Self::TaxDocument),
            "other" => Ok(Self::Other),
            "non_financial" => Ok(Self::NonFinancial),
            _ => Err(format!("Invalid document type: {}", s)),
        }
    }
}

/// Per-tenant quota bucket an attachment's bytes are counted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaCategory {
    Invoice,
    Receipt,
    Statement,
    Other,
}

// =============================================================================
// SCANNING
// =============================================================================

/// Verdict returned by a virus scanner implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanVerdict {
    Clean,
    Infected,
    Suspicious,
}

impl std::fmt::Display for ScanVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Infected => write!(f, "infected"),
            Self::Suspicious => write!(f, "suspicious"),
        }
    }
}

impl std::str::FromStr for ScanVerdict {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clean" => Ok(Self::Clean),
            "infected" => Ok(Self::Infected),
            "suspicious" => Ok(Self::Suspicious),
            _ => Err(format!("Invalid scan verdict: {}", s)),
        }
    }
}

// =============================================================================
// EXTRACTION SUB-STATUS
// =============================================================================

/// Downstream extraction sub-status, independent of the attachment's own
/// lifecycle status. A routing failure downgrades only this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionState {
    Pending,
    Completed,
    Failed,
}

impl std::fmt::Display for ExtractionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ExtractionState {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid extraction state: {}", s)),
        }
    }
}

// =============================================================================
// ATTACHMENT
// =============================================================================

/// Durable metadata row tracking one email attachment through its lifecycle.
///
/// One row per (email_id, external_id); re-discovery of the same attachment
/// updates the row instead of duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub email_id: Uuid,
    /// Provider-specific attachment identifier.
    pub external_id: String,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub provider: Provider,

    pub filename: String,
    pub original_filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub extension: Option<String>,
    /// Lowercase SHA-256 hex digest, set exactly once when bytes are stored.
    pub content_hash: Option<String>,

    pub storage_backend: Option<StorageKind>,
    pub storage_path: Option<String>,
    pub storage_url: Option<String>,
    pub bucket: Option<String>,
    pub object_key: Option<String>,

    pub status: AttachmentStatus,
    pub processing_error: Option<String>,
    pub retry_count: i32,

    pub classified_type: Option<DocumentType>,
    pub classification_confidence: Option<f32>,
    pub classified_at: Option<DateTime<Utc>>,

    pub is_scanned: bool,
    pub scan_result: Option<ScanVerdict>,
    pub scan_provider: Option<String>,
    pub scanned_at: Option<DateTime<Utc>>,

    pub extracted_data_id: Option<Uuid>,
    pub extraction_status: Option<ExtractionState>,
    pub extraction_error: Option<String>,
    pub extracted_at: Option<DateTime<Utc>>,

    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// One page of an attachment listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentPage {
    pub items: Vec<Attachment>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

/// Filters for attachment listings.
#[derive(Debug, Clone, Default)]
pub struct AttachmentFilter {
    pub email_id: Option<Uuid>,
    pub status: Option<AttachmentStatus>,
    pub document_type: Option<DocumentType>,
}

/// Per-tenant attachment statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentStats {
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
    pub pending: i64,
    pub quarantined: i64,
    pub total_bytes: i64,
    /// Count of classified attachments per document type label.
    pub by_type: std::collections::HashMap<String, i64>,
}

// =============================================================================
// STORAGE QUOTA
// =============================================================================

/// Per-tenant running totals of storage consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageQuota {
    pub org_id: Uuid,
    pub total_quota: i64,
    pub used_space: i64,
    pub attachment_count: i64,

    pub invoice_space: i64,
    pub receipt_space: i64,
    pub statement_space: i64,
    pub other_space: i64,

    pub auto_cleanup_enabled: bool,
    pub retention_days: i32,
    /// Alert threshold as an integer percentage of `total_quota`.
    pub alert_threshold: i32,
    pub alert_sent: bool,
    pub alert_sent_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StorageQuota {
    /// Integer usage percentage; avoids float rounding on large byte counts.
    pub fn usage_percent(&self) -> i64 {
        if self.total_quota <= 0 {
            return 100;
        }
        self.used_space.saturating_mul(100) / self.total_quota
    }
}

/// Mutable tenant quota policy settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaSettings {
    pub total_quota: Option<i64>,
    pub alert_threshold: Option<i32>,
    pub auto_cleanup_enabled: Option<bool>,
    pub retention_days: Option<i32>,
    /// Re-arm the alert latch so the next threshold crossing fires again.
    #[serde(default)]
    pub reset_alert: bool,
}

// =============================================================================
// EMAIL (upstream record, consumed not owned)
// =============================================================================

/// Attachment metadata recorded by the email-sync process before any bytes
/// are fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentManifestEntry {
    pub external_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
}

/// Minimal view of a synced email, enough to drive attachment processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    pub id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub connection_id: Uuid,
    pub provider: Provider,
    pub external_id: String,
    pub subject: Option<String>,
    /// Attachments the sync process observed on this email.
    pub attachments: Vec<AttachmentManifestEntry>,
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// JOB TYPES
// =============================================================================

/// Status of a job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Type of job to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Drive one attachment through the download/store/scan/classify pipeline
    ProcessAttachment,
    /// Structured extraction queue for invoice-like documents
    ExtractInvoice,
    /// Structured extraction queue for receipts
    ExtractReceipt,
}

impl JobType {
    /// Default priority for this job type (higher = more urgent).
    pub fn default_priority(&self) -> i32 {
        match self {
            // Ingest gates everything downstream
            JobType::ProcessAttachment => 7,
            JobType::ExtractInvoice => 5,
            JobType::ExtractReceipt => 5,
        }
    }
}

/// A job in the processing queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub payload: Option<JsonValue>,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    /// Earliest time a retried job becomes claimable again.
    pub run_after: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Queue statistics summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed_last_hour: i64,
    pub failed_last_hour: i64,
    pub total: i64,
}

// =============================================================================
// JOB PAYLOADS
// =============================================================================

/// Payload of a `ProcessAttachment` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentJobPayload {
    pub attachment_id: Uuid,
    pub email_id: Uuid,
    pub connection_id: Uuid,
    pub provider: Provider,
    pub external_id: String,
    pub org_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub skip_scanning: bool,
}

/// Options forwarded to a downstream extraction worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOptions {
    pub max_retries: i32,
    pub timeout_ms: u64,
    pub enable_fallback: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            max_retries: crate::defaults::JOB_MAX_RETRIES,
            timeout_ms: crate::defaults::JOB_TIMEOUT_SECS * 1000,
            enable_fallback: true,
        }
    }
}

/// Payload of an `ExtractInvoice`/`ExtractReceipt` job.
///
/// References the stored attachment instead of carrying raw bytes; the
/// extraction worker resolves content from storage at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionJobPayload {
    pub attachment_id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub mime_type: String,
    pub file_name: String,
    #[serde(default)]
    pub options: ExtractionOptions,
}

// =============================================================================
// OPERATION INPUTS / OUTPUTS
// =============================================================================

/// Options for batch attachment processing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    pub force_reprocess: bool,
    pub skip_scanning: bool,
}

/// Result of a batch processing trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchQueued {
    pub queued_count: usize,
    pub job_ids: Vec<Uuid>,
}

/// Options for downloading attachment content.
#[derive(Debug, Clone, Copy)]
pub struct DownloadOptions {
    /// Return a time-limited URL instead of the bytes (object storage only).
    pub return_url: bool,
    pub expires_in_secs: u64,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            return_url: false,
            expires_in_secs: crate::defaults::SIGNED_URL_EXPIRY_SECS,
        }
    }
}

/// Downloaded attachment content, either raw or as a presigned URL.
#[derive(Debug, Clone)]
pub enum DownloadResult {
    Bytes {
        data: Vec<u8>,
        mime_type: String,
        filename: String,
    },
    Url(String),
}

/// Options for deleting an attachment.
#[derive(Debug, Clone, Copy)]
pub struct DeleteOptions {
    pub delete_from_storage: bool,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            delete_from_storage: true,
        }
    }
}

/// Options for re-queueing failed attachments.
#[derive(Debug, Clone, Default)]
pub struct RetryOptions {
    pub email_id: Option<Uuid>,
    pub max_retries: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_round_trip() {
        for status in [
            AttachmentStatus::Pending,
            AttachmentStatus::Downloading,
            AttachmentStatus::Downloaded,
            AttachmentStatus::Scanning,
            AttachmentStatus::Classifying,
            AttachmentStatus::Classified,
            AttachmentStatus::Extracting,
            AttachmentStatus::Completed,
            AttachmentStatus::Failed,
            AttachmentStatus::Quarantined,
        ] {
            let recovered = AttachmentStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(status, recovered);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(AttachmentStatus::Completed.is_terminal());
        assert!(AttachmentStatus::Failed.is_terminal());
        assert!(AttachmentStatus::Quarantined.is_terminal());
        assert!(!AttachmentStatus::Pending.is_terminal());
        assert!(!AttachmentStatus::Extracting.is_terminal());
    }

    #[test]
    fn test_happy_path_transitions() {
        use AttachmentStatus::*;
        let path = [
            Pending,
            Downloading,
            Downloaded,
            Scanning,
            Classifying,
            Classified,
            Extracting,
            Completed,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be valid",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_skip_scanning_transition() {
        assert!(AttachmentStatus::Downloaded.can_transition_to(AttachmentStatus::Classifying));
    }

    #[test]
    fn test_quarantine_only_from_scanning() {
        use AttachmentStatus::*;
        assert!(Scanning.can_transition_to(Quarantined));
        for from in [Pending, Downloading, Downloaded, Classifying, Classified] {
            assert!(!from.can_transition_to(Quarantined), "{} -> quarantined", from);
        }
    }

    #[test]
    fn test_no_regression() {
        use AttachmentStatus::*;
        assert!(!Downloaded.can_transition_to(Downloading));
        assert!(!Classified.can_transition_to(Scanning));
        assert!(!Completed.can_transition_to(Downloading));
        assert!(!Completed.can_transition_to(Extracting));
    }

    #[test]
    fn test_any_active_state_can_fail() {
        use AttachmentStatus::*;
        for from in [
            Pending,
            Downloading,
            Downloaded,
            Scanning,
            Classifying,
            Classified,
            Extracting,
        ] {
            assert!(from.can_transition_to(Failed), "{} -> failed", from);
        }
    }

    #[test]
    fn test_terminal_states_cannot_fail_again() {
        use AttachmentStatus::*;
        assert!(!Failed.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Quarantined.can_transition_to(Failed));
    }

    #[test]
    fn test_retry_paths() {
        use AttachmentStatus::*;
        assert!(Failed.can_transition_to(Pending));
        assert!(Completed.can_transition_to(Pending));
        assert!(!Quarantined.can_transition_to(Pending));
    }

    #[test]
    fn test_predecessors_agree_with_transition_table() {
        use AttachmentStatus::*;
        let all = [
            Pending,
            Downloading,
            Downloaded,
            Scanning,
            Classifying,
            Classified,
            Extracting,
            Completed,
            Failed,
            Quarantined,
        ];
        for to in all {
            for from in all {
                let listed = to.valid_predecessors().contains(&from);
                assert_eq!(
                    listed,
                    from.can_transition_to(to),
                    "predecessor table disagrees for {} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_is_at_or_beyond_forward_chain() {
        use AttachmentStatus::*;
        assert!(Classified.is_at_or_beyond(Downloading));
        assert!(Classified.is_at_or_beyond(Classified));
        assert!(Completed.is_at_or_beyond(Extracting));
        assert!(!Downloaded.is_at_or_beyond(Classifying));
        assert!(!Pending.is_at_or_beyond(Downloading));
    }

    #[test]
    fn test_is_at_or_beyond_branches() {
        use AttachmentStatus::*;
        // Quarantined passed the scan stage but nothing after it.
        assert!(Quarantined.is_at_or_beyond(Scanning));
        assert!(Quarantined.is_at_or_beyond(Downloaded));
        assert!(!Quarantined.is_at_or_beyond(Classifying));
        // Failed is a branch, never "beyond" a pipeline stage.
        assert!(!Failed.is_at_or_beyond(Pending));
        assert!(!Failed.is_at_or_beyond(Downloading));
        assert!(Failed.is_at_or_beyond(Failed));
    }

    #[test]
    fn test_document_type_round_trip() {
        for dt in [
            DocumentType::Invoice,
            DocumentType::Receipt,
            DocumentType::Statement,
            DocumentType::Contract,
            DocumentType::Quote,
            DocumentType::DeliveryNote,
            DocumentType::PaymentProof,
            DocumentType::TaxDocument,
            DocumentType::Other,
            DocumentType::NonFinancial,
        ] {
            let recovered = DocumentType::from_str(&dt.to_string()).unwrap();
            assert_eq!(dt, recovered);
        }
    }

    #[test]
    fn test_quota_categories() {
        assert_eq!(
            DocumentType::Invoice.quota_category(),
            QuotaCategory::Invoice
        );
        assert_eq!(
            DocumentType::Receipt.quota_category(),
            QuotaCategory::Receipt
        );
        assert_eq!(
            DocumentType::Statement.quota_category(),
            QuotaCategory::Statement
        );
        assert_eq!(DocumentType::Quote.quota_category(), QuotaCategory::Other);
        assert_eq!(
            DocumentType::NonFinancial.quota_category(),
            QuotaCategory::Other
        );
    }

    #[test]
    fn test_provider_round_trip() {
        for p in [Provider::Gmail, Provider::Outlook, Provider::Xero] {
            assert_eq!(Provider::from_str(&p.to_string()).unwrap(), p);
        }
        assert!(Provider::from_str("yahoo").is_err());
    }

    #[test]
    fn test_usage_percent_integer_math() {
        let mut quota = StorageQuota {
            org_id: Uuid::nil(),
            total_quota: 5 * 1024 * 1024 * 1024,
            used_space: 4 * 1024 * 1024 * 1024,
            attachment_count: 10,
            invoice_space: 0,
            receipt_space: 0,
            statement_space: 0,
            other_space: 0,
            auto_cleanup_enabled: false,
            retention_days: 365,
            alert_threshold: 80,
            alert_sent: false,
            alert_sent_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(quota.usage_percent(), 80);

        quota.used_space = quota.total_quota;
        assert_eq!(quota.usage_percent(), 100);

        quota.used_space = 0;
        assert_eq!(quota.usage_percent(), 0);

        // A zero-byte budget is always full.
        quota.total_quota = 0;
        assert_eq!(quota.usage_percent(), 100);
    }

    #[test]
    fn test_attachment_job_payload_serde() {
        let payload = AttachmentJobPayload {
            attachment_id: Uuid::new_v4(),
            email_id: Uuid::new_v4(),
            connection_id: Uuid::new_v4(),
            provider: Provider::Gmail,
            external_id: "ANGjdJ8".to_string(),
            org_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            skip_scanning: false,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["provider"], "gmail");
        let back: AttachmentJobPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back.attachment_id, payload.attachment_id);
        assert!(!back.skip_scanning);
    }

    #[test]
    fn test_attachment_job_payload_skip_scanning_defaults_false() {
        let json = serde_json::json!({
            "attachment_id": Uuid::new_v4(),
            "email_id": Uuid::new_v4(),
            "connection_id": Uuid::new_v4(),
            "provider": "outlook",
            "external_id": "abc",
            "org_id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
        });
        let payload: AttachmentJobPayload = serde_json::from_value(json).unwrap();
        assert!(!payload.skip_scanning);
    }

    #[test]
    fn test_extraction_payload_defaults() {
        let opts = ExtractionOptions::default();
        assert_eq!(opts.max_retries, 3);
        assert_eq!(opts.timeout_ms, 300_000);
        assert!(opts.enable_fallback);
    }

    #[test]
    fn test_job_type_priorities() {
        assert!(
            JobType::ProcessAttachment.default_priority()
                > JobType::ExtractInvoice.default_priority()
        );
    }
}
