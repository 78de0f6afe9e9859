//! # ledgerbox-db
//!
//! PostgreSQL database layer for the ledgerbox attachment pipeline.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for emails, attachments, quotas, and jobs
//! - Atomic quota accounting safe under concurrent workers
//! - A skip-locked job queue with exponential retry backoff
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledgerbox_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/ledgerbox").await?;
//!     let quota = db.quotas.get_or_create(org_id).await?;
//!     println!("used: {} of {}", quota.used_space, quota.total_quota);
//!     Ok(())
//! }
//! ```

pub mod attachments;
pub mod emails;
pub mod jobs;
pub mod pool;
pub mod quotas;

// Re-export core types
pub use ledgerbox_core::*;

// Re-export repository implementations
pub use attachments::{PgAttachmentRepository, StoredDescriptor};
pub use emails::PgEmailRepository;
pub use jobs::PgJobRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use quotas::PgQuotaRepository;

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Email read side (rows owned by the upstream sync process).
    pub emails: PgEmailRepository,
    /// Attachment lifecycle repository.
    pub attachments: PgAttachmentRepository,
    /// Per-tenant storage quota ledger.
    pub quotas: PgQuotaRepository,
    /// Background job queue.
    pub jobs: PgJobRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            emails: PgEmailRepository::new(pool.clone()),
            attachments: PgAttachmentRepository::new(pool.clone()),
            quotas: PgQuotaRepository::new(pool.clone()),
            jobs: PgJobRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
