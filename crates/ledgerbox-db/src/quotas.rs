//! Storage quota ledger.
//!
//! Per-tenant counters are mutated with single-statement atomic increments;
//! concurrent attachment jobs for the same tenant never read-modify-write
//! these counters in application code, so no updates are lost.

use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use ledgerbox_core::{
    defaults, Error, QuotaCategory, QuotaSettings, Result, StorageQuota,
};

/// PostgreSQL implementation of the quota ledger.
pub struct PgQuotaRepository {
    pool: PgPool,
}

impl PgQuotaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch the tenant's ledger, creating it with system defaults on first
    /// access.
    pub async fn get_or_create(&self, org_id: Uuid) -> Result<StorageQuota> {
        sqlx::query(
            r#"INSERT INTO storage_quota (org_id, total_quota, alert_threshold, retention_days)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (org_id) DO NOTHING"#,
        )
        .bind(org_id)
        .bind(defaults::QUOTA_TOTAL_BYTES)
        .bind(defaults::QUOTA_ALERT_THRESHOLD_PERCENT)
        .bind(defaults::QUOTA_RETENTION_DAYS)
        .execute(&self.pool)
        .await?;

        self.get(org_id).await
    }

    /// Fetch the tenant's ledger.
    pub async fn get(&self, org_id: Uuid) -> Result<StorageQuota> {
        let row = sqlx::query(
            r#"SELECT org_id, total_quota, used_space, attachment_count,
                      invoice_space, receipt_space, statement_space, other_space,
                      auto_cleanup_enabled, retention_days,
                      alert_threshold, alert_sent, alert_sent_at,
                      created_at, updated_at
               FROM storage_quota WHERE org_id = $1"#,
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Storage quota for org {} not found", org_id)))?;

        Ok(quota_from_row(&row))
    }

    /// Enforce the tenant budget before new processing.
    ///
    /// Fails with `QuotaExceeded` at 100 % usage. Crossing the alert
    /// threshold flips the one-shot alert latch; the guarded UPDATE makes
    /// the latch race-free, so only one crossing ever fires it until it is
    /// explicitly reset.
    pub async fn check(&self, org_id: Uuid) -> Result<StorageQuota> {
        let quota = self.get_or_create(org_id).await?;
        let usage_percent = quota.usage_percent();

        if usage_percent >= 100 {
            return Err(Error::QuotaExceeded {
                used: quota.used_space,
                total: quota.total_quota,
            });
        }

        if usage_percent >= quota.alert_threshold as i64 && !quota.alert_sent {
            let result = sqlx::query(
                r#"UPDATE storage_quota
                   SET alert_sent = TRUE, alert_sent_at = NOW(), updated_at = NOW()
                   WHERE org_id = $1 AND alert_sent = FALSE"#,
            )
            .bind(org_id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                info!(
                    org_id = %org_id,
                    usage_percent,
                    threshold = quota.alert_threshold,
                    "storage quota alert threshold crossed"
                );
            }
        }

        Ok(quota)
    }

    /// Atomically apply a usage delta to the tenant totals.
    ///
    /// The attachment count follows the delta's sign; a zero delta leaves
    /// it untouched. `used_space` is clamped at zero so a double-reversed
    /// delete can never drive it negative.
    pub async fn apply_usage_delta(&self, org_id: Uuid, size_delta: i64) -> Result<()> {
        self.get_or_create(org_id).await?;

        sqlx::query(
            r#"UPDATE storage_quota
               SET used_space = GREATEST(used_space + $2, 0),
                   attachment_count = GREATEST(
                       attachment_count + CASE WHEN $2 > 0 THEN 1 WHEN $2 < 0 THEN -1 ELSE 0 END,
                       0),
                   updated_at = NOW()
               WHERE org_id = $1"#,
        )
        .bind(org_id)
        .bind(size_delta)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically move bytes into (or out of) one category bucket.
    ///
    /// Buckets subdivide `used_space`; this never touches the totals, so
    /// categorizing an already-counted attachment keeps the invariant
    /// `sum(buckets) <= used_space`.
    pub async fn apply_category_delta(
        &self,
        org_id: Uuid,
        category: QuotaCategory,
        size_delta: i64,
    ) -> Result<()> {
        let column = match category {
            QuotaCategory::Invoice => "invoice_space",
            QuotaCategory::Receipt => "receipt_space",
            QuotaCategory::Statement => "statement_space",
            QuotaCategory::Other => "other_space",
        };

        let query = format!(
            "UPDATE storage_quota
             SET {column} = GREATEST({column} + $2, 0), updated_at = NOW()
             WHERE org_id = $1"
        );

        sqlx::query(&query)
            .bind(org_id)
            .bind(size_delta)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Update tenant quota policy settings.
    pub async fn update_settings(
        &self,
        org_id: Uuid,
        settings: &QuotaSettings,
    ) -> Result<StorageQuota> {
        self.get_or_create(org_id).await?;

        sqlx::query(
            r#"UPDATE storage_quota
               SET total_quota = COALESCE($2, total_quota),
                   alert_threshold = COALESCE($3, alert_threshold),
                   auto_cleanup_enabled = COALESCE($4, auto_cleanup_enabled),
                   retention_days = COALESCE($5, retention_days),
                   updated_at = NOW()
               WHERE org_id = $1"#,
        )
        .bind(org_id)
        .bind(settings.total_quota)
        .bind(settings.alert_threshold)
        .bind(settings.auto_cleanup_enabled)
        .bind(settings.retention_days)
        .execute(&self.pool)
        .await?;

        if settings.reset_alert {
            self.reset_alert(org_id).await?;
        }

        self.get(org_id).await
    }

    /// Re-arm the alert latch so the next threshold crossing fires again.
    pub async fn reset_alert(&self, org_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"UPDATE storage_quota
               SET alert_sent = FALSE, alert_sent_at = NULL, updated_at = NOW()
               WHERE org_id = $1"#,
        )
        .bind(org_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn quota_from_row(row: &sqlx::postgres::PgRow) -> StorageQuota {
    StorageQuota {
        org_id: row.get("org_id"),
        total_quota: row.get("total_quota"),
        used_space: row.get("used_space"),
        attachment_count: row.get("attachment_count"),
        invoice_space: row.get("invoice_space"),
        receipt_space: row.get("receipt_space"),
        statement_space: row.get("statement_space"),
        other_space: row.get("other_space"),
        auto_cleanup_enabled: row.get("auto_cleanup_enabled"),
        retention_days: row.get("retention_days"),
        alert_threshold: row.get("alert_threshold"),
        alert_sent: row.get("alert_sent"),
        alert_sent_at: row.get("alert_sent_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
