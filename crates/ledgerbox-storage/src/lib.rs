//! # ledgerbox-storage
//!
//! Durable byte stores behind a uniform interface.
//!
//! Two backends implement [`StorageBackend`]: a local filesystem store and
//! an S3-compatible object store. The backend is selected once at startup
//! from configuration; everything above the trait is backend-agnostic.
//!
//! [`ObjectStore`] layers the pipeline-level operations on top: content
//! hashing, collision-resistant path generation, best-effort deletes, and
//! presigned URL issuance.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledgerbox_storage::{ObjectStore, StorageConfig};
//!
//! let config = StorageConfig::from_env()?;
//! let store = ObjectStore::new(config.build()?);
//!
//! let stored = store.put(org_id, "invoice.pdf", "application/pdf", &data).await?;
//! let bytes = store.get(&stored.path).await?;
//! ```

pub mod config;
pub mod local;
pub mod s3;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use ledgerbox_core::{sanitize_filename, Result, StorageKind};

pub use config::{S3Config, StorageConfig};
pub use local::LocalBackend;
pub use s3::S3Backend;

/// Storage backend trait for different storage implementations.
///
/// Allows abstracting over the local filesystem, S3, or other object
/// storage providers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Which backend family this is; persisted on the attachment record.
    fn kind(&self) -> StorageKind;

    /// The object-storage bucket, when one exists for this backend.
    fn bucket(&self) -> Option<&str> {
        None
    }

    /// Write data to the specified path.
    async fn write(&self, path: &str, data: &[u8], content_type: &str) -> Result<()>;

    /// Read data from the specified path.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete data at the specified path. Missing objects are not an error.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if data exists at the specified path.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Issue a time-limited URL for the object.
    ///
    /// Only object-storage backends support this; the local backend fails
    /// with a client error.
    async fn signed_url(&self, path: &str, expires_in: Duration) -> Result<String>;
}

/// Compute the lowercase SHA-256 hex digest of data.
///
/// Deterministic and backend-independent: the same byte content always
/// yields the same digest regardless of where it is stored.
pub fn compute_content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Generate a collision-resistant storage path for a tenant's file.
///
/// Path format: `{org_id}/{unix_millis}-{sanitized_filename}`
pub fn generate_storage_path(org_id: Uuid, timestamp_millis: i64, filename: &str) -> String {
    format!(
        "{}/{}-{}",
        org_id.as_hyphenated(),
        timestamp_millis,
        sanitize_filename(filename)
    )
}

/// Descriptor returned by [`ObjectStore::put`], persisted onto the
/// attachment record.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub backend: StorageKind,
    pub path: String,
    pub url: Option<String>,
    pub bucket: Option<String>,
    pub object_key: Option<String>,
    pub content_hash: String,
    pub size_bytes: i64,
}

/// Backend-agnostic store the orchestrator talks to.
#[derive(Clone)]
pub struct ObjectStore {
    backend: Arc<dyn StorageBackend>,
}

impl ObjectStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn kind(&self) -> StorageKind {
        self.backend.kind()
    }

    /// Store a file and return its descriptor.
    ///
    /// Hashes the full content before placement; I/O failures surface as
    /// server-side errors since the caller must mark the attachment failed
    /// rather than silently lose data.
    pub async fn put(
        &self,
        org_id: Uuid,
        filename: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<StoredObject> {
        let content_hash = compute_content_hash(data);
        let path = generate_storage_path(org_id, Utc::now().timestamp_millis(), filename);

        self.backend.write(&path, data, content_type).await?;

        info!(
            storage_backend = %self.backend.kind(),
            storage_path = %path,
            size_bytes = data.len(),
            "stored attachment content"
        );

        let (bucket, object_key) = match self.backend.bucket() {
            Some(bucket) => (Some(bucket.to_string()), Some(path.clone())),
            None => (None, None),
        };

        Ok(StoredObject {
            backend: self.backend.kind(),
            path,
            url: None,
            bucket,
            object_key,
            content_hash,
            size_bytes: data.len() as i64,
        })
    }

    /// Read stored content back.
    pub async fn get(&self, path: &str) -> Result<Vec<u8>> {
        self.backend.read(path).await
    }

    /// Best-effort delete: failures are logged, not propagated. A missing
    /// object at delete time is not an error condition.
    pub async fn remove(&self, path: &str) {
        if let Err(e) = self.backend.delete(path).await {
            warn!(
                storage_backend = %self.backend.kind(),
                storage_path = %path,
                error = %e,
                "failed to delete stored content"
            );
        }
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        self.backend.exists(path).await
    }

    /// Issue a time-limited signed URL for the object.
    pub async fn presign(&self, path: &str, expires_in_secs: u64) -> Result<String> {
        self.backend
            .signed_url(path, Duration::from_secs(expires_in_secs))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_matches_sha256() {
        // sha256("hello world")
        assert_eq!(
            compute_content_hash(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_content_hash_empty_input() {
        // sha256("")
        assert_eq!(
            compute_content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_content_hash_deterministic() {
        let data = b"the same bytes";
        assert_eq!(compute_content_hash(data), compute_content_hash(data));
        assert_ne!(compute_content_hash(data), compute_content_hash(b"other"));
    }

    #[test]
    fn test_storage_path_format() {
        let org_id = Uuid::nil();
        let path = generate_storage_path(org_id, 1700000000123, "invoice.pdf");
        assert_eq!(
            path,
            "00000000-0000-0000-0000-000000000000/1700000000123-invoice.pdf"
        );
    }

    #[test]
    fn test_storage_path_sanitizes_filename() {
        let org_id = Uuid::nil();
        let path = generate_storage_path(org_id, 42, "../../etc/passwd");
        assert!(!path.contains(".."));
        assert!(path.ends_with("/42-passwd"));

        let path = generate_storage_path(org_id, 42, "inv oice (1).pdf");
        // Exactly one separator: the org prefix.
        assert_eq!(path.matches('/').count(), 1);
    }
}
