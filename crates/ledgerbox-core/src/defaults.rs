//! Centralized default constants for the ledgerbox system.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates reference these constants instead of defining their
//! own magic numbers.

// =============================================================================
// STORAGE QUOTA
// =============================================================================

/// Default per-tenant storage budget in bytes (5 GiB).
pub const QUOTA_TOTAL_BYTES: i64 = 5 * 1024 * 1024 * 1024;

/// Default alert threshold as a percentage of the quota.
pub const QUOTA_ALERT_THRESHOLD_PERCENT: i32 = 80;

/// Default retention window for auto-cleanup, in days.
pub const QUOTA_RETENTION_DAYS: i32 = 365;

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Default local storage root when `STORAGE_LOCAL_ROOT` is unset.
pub const STORAGE_LOCAL_ROOT: &str = "/var/ledgerbox/attachments";

/// Default presigned URL validity in seconds (1 hour).
pub const SIGNED_URL_EXPIRY_SECS: u64 = 3600;

/// Maximum stored filename length after sanitization.
pub const FILENAME_MAX_LENGTH: usize = 255;

// =============================================================================
// JOB PROCESSING
// =============================================================================

/// Default maximum delivery attempts for a queued job.
pub const JOB_MAX_RETRIES: i32 = 3;

/// Base delay for exponential retry backoff, in seconds.
pub const JOB_BACKOFF_BASE_SECS: i64 = 1;

/// Default polling interval when the queue is empty (milliseconds).
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Default maximum concurrent jobs per worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Default global claim rate limit, in jobs per second.
pub const JOB_RATE_LIMIT_PER_SEC: usize = 10;

/// Default job execution timeout in seconds (5 minutes).
pub const JOB_TIMEOUT_SECS: u64 = 300;

/// Retention window for completed job rows, in hours.
pub const JOB_RETENTION_COMPLETED_HOURS: i32 = 24;

/// Retention window for failed job rows, in days.
pub const JOB_RETENTION_FAILED_DAYS: i32 = 7;

/// Event bus broadcast channel capacity for worker events.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for attachment listings.
pub const PAGE_LIMIT: i64 = 50;

/// Upper bound on requested page sizes.
pub const PAGE_LIMIT_MAX: i64 = 200;

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Hard cap on classifier confidence; keyword scoring never reaches certainty.
pub const CLASSIFY_CONFIDENCE_CAP: f32 = 0.95;

/// Confidence assigned to files outside the document MIME allow-list.
pub const CLASSIFY_NON_FINANCIAL_CONFIDENCE: f32 = 0.9;

/// Confidence assigned when no keyword set scores at all.
pub const CLASSIFY_FALLBACK_CONFIDENCE: f32 = 0.5;

/// Minimum confidence improvement required before a reclassification
/// replaces the existing label.
pub const RECLASSIFY_MARGIN: f32 = 0.1;

/// Extraction threshold for invoice-like types (invoice, receipt,
/// payment proof).
pub const EXTRACT_THRESHOLD_PRIMARY: f32 = 0.6;

/// Extraction threshold for statement-like types (statement, quote,
/// delivery note, tax document) and the default for unlisted types.
pub const EXTRACT_THRESHOLD_SECONDARY: f32 = 0.7;

/// Extraction threshold for contracts.
pub const EXTRACT_THRESHOLD_CONTRACT: f32 = 0.8;

/// Extraction threshold for the catch-all `Other` type.
pub const EXTRACT_THRESHOLD_OTHER: f32 = 0.5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_defaults_are_sane() {
        const {
            assert!(QUOTA_TOTAL_BYTES > 0);
            assert!(QUOTA_ALERT_THRESHOLD_PERCENT > 0 && QUOTA_ALERT_THRESHOLD_PERCENT < 100);
        }
    }

    #[test]
    fn extraction_thresholds_ordered() {
        // Runtime check needed for floating point comparisons
        assert!(EXTRACT_THRESHOLD_OTHER < EXTRACT_THRESHOLD_PRIMARY);
        assert!(EXTRACT_THRESHOLD_PRIMARY < EXTRACT_THRESHOLD_SECONDARY);
        assert!(EXTRACT_THRESHOLD_SECONDARY < EXTRACT_THRESHOLD_CONTRACT);
        assert!(EXTRACT_THRESHOLD_CONTRACT < CLASSIFY_CONFIDENCE_CAP);
    }

    #[test]
    fn retention_windows_ordered() {
        const {
            assert!(JOB_RETENTION_COMPLETED_HOURS < JOB_RETENTION_FAILED_DAYS * 24);
        }
    }
}
