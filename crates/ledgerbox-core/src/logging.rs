//! Structured logging field name constants for ledgerbox.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "pipeline", "storage", "db", "worker"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "object_store", "quota", "claim_loop"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "process_single", "store", "claim_next"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Tenant (organization) UUID.
pub const ORG_ID: &str = "org_id";

/// Attachment UUID being operated on.
pub const ATTACHMENT_ID: &str = "attachment_id";

/// Email UUID the attachment belongs to.
pub const EMAIL_ID: &str = "email_id";

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Job type enum variant.
pub const JOB_TYPE: &str = "job_type";

/// Storage backend handling the operation ("local" | "s3").
pub const STORAGE_BACKEND: &str = "storage_backend";

/// Storage path or object key.
pub const STORAGE_PATH: &str = "storage_path";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Payload size in bytes.
pub const SIZE_BYTES: &str = "size_bytes";

/// Tenant quota usage percentage after an update.
pub const USAGE_PERCENT: &str = "usage_percent";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
