//! Email repository.
//!
//! Emails are written by the upstream sync process; the pipeline only reads
//! them to enumerate attachment metadata and enforce tenant ownership.

use std::str::FromStr;

use sqlx::{PgPool, Row};
use uuid::Uuid;

use ledgerbox_core::{AttachmentManifestEntry, Email, Error, Provider, Result};

/// PostgreSQL implementation of the email read side.
pub struct PgEmailRepository {
    pool: PgPool,
}

impl PgEmailRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch an email with its attachment manifest.
    pub async fn get(&self, email_id: Uuid) -> Result<Option<Email>> {
        let row = sqlx::query(
            r#"SELECT id, org_id, user_id, connection_id, provider, external_id,
                      subject, attachments, received_at, created_at
               FROM email WHERE id = $1"#,
        )
        .bind(email_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(email_from_row).transpose()
    }
}

fn email_from_row(row: sqlx::postgres::PgRow) -> Result<Email> {
    let provider_str: String = row.get("provider");
    let provider = Provider::from_str(&provider_str).map_err(Error::InvalidInput)?;

    let manifest: serde_json::Value = row.get("attachments");
    let attachments: Vec<AttachmentManifestEntry> = serde_json::from_value(manifest)?;

    Ok(Email {
        id: row.get("id"),
        org_id: row.get("org_id"),
        user_id: row.get("user_id"),
        connection_id: row.get("connection_id"),
        provider,
        external_id: row.get("external_id"),
        subject: row.get("subject"),
        attachments,
        received_at: row.get("received_at"),
        created_at: row.get("created_at"),
    })
}
