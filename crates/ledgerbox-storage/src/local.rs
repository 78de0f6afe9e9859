//! Local filesystem storage backend.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use ledgerbox_core::{Error, Result, StorageKind};

use crate::StorageBackend;

/// Filesystem storage backend rooted at a configured directory.
///
/// Paths handed to this backend are relative (`{org_id}/{millis}-{name}`);
/// parent directories are created as needed and writes are atomic
/// (temp file + rename).
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new filesystem backend with the given root directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    /// Validate that the backend can write, read, and delete files.
    ///
    /// Performs a full round-trip at startup to catch filesystem issues
    /// (overlayfs quirks, permission errors, missing directories) early.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_dir = self.root.join(".health-check");
        let test_file = test_dir.join("probe.bin");

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", test_dir, e))?;

        let data = b"storage-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", test_file, e))?;

        let read_back = fs::read(&test_file)
            .await
            .map_err(|e| format!("read({:?}): {}", test_file, e))?;
        if read_back != data {
            return Err("read-back mismatch".to_string());
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", test_file, e))?;
        let _ = fs::remove_dir(&test_dir).await;

        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }

    async fn write(&self, path: &str, data: &[u8], _content_type: &str) -> Result<()> {
        let full_path = self.full_path(path);
        debug!(storage_path = %path, size_bytes = data.len(), "local backend: write");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "local backend: create_dir_all failed");
                e
            })?;
        }

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            warn!(temp_path = %temp_path.display(), error = %e, "local backend: create failed");
            e
        })?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "local backend: rename failed");
            e
        })?;

        // 0644, no execute
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path);
        Ok(fs::read(full_path).await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        if fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path);
        Ok(fs::try_exists(full_path).await?)
    }

    async fn signed_url(&self, _path: &str, _expires_in: Duration) -> Result<String> {
        Err(Error::InvalidInput(
            "signed URLs are only available for the s3 backend".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObjectStore;
    use std::sync::Arc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn backend(dir: &TempDir) -> LocalBackend {
        LocalBackend::new(dir.path())
    }

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);

        backend
            .write("org/1-invoice.pdf", b"%PDF-1.4 payload", "application/pdf")
            .await
            .unwrap();
        let data = backend.read("org/1-invoice.pdf").await.unwrap();
        assert_eq!(data, b"%PDF-1.4 payload");
    }

    #[tokio::test]
    async fn test_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);

        backend
            .write("a/b/deep.bin", b"x", "application/octet-stream")
            .await
            .unwrap();
        assert!(backend.exists("a/b/deep.bin").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);

        backend.write("f.bin", b"x", "text/plain").await.unwrap();
        backend.delete("f.bin").await.unwrap();
        assert!(!backend.exists("f.bin").await.unwrap());
        // Deleting a missing file is not an error.
        backend.delete("f.bin").await.unwrap();
    }

    #[tokio::test]
    async fn test_read_missing_is_error() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        assert!(backend.read("nope.bin").await.is_err());
    }

    #[tokio::test]
    async fn test_signed_url_is_client_error() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        let err = backend
            .signed_url("f.bin", Duration::from_secs(3600))
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn test_validate_round_trip() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        backend.validate().await.unwrap();
    }

    #[tokio::test]
    async fn test_object_store_round_trip_and_hash() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(Arc::new(LocalBackend::new(dir.path())));
        let org_id = Uuid::new_v4();
        let data = b"invoice body bytes";

        let stored = store
            .put(org_id, "invoice march.pdf", "application/pdf", data)
            .await
            .unwrap();

        assert_eq!(stored.backend, StorageKind::Local);
        assert_eq!(stored.size_bytes, data.len() as i64);
        assert_eq!(stored.content_hash, crate::compute_content_hash(data));
        assert!(stored.path.starts_with(&org_id.to_string()));
        assert!(stored.bucket.is_none());

        let read_back = store.get(&stored.path).await.unwrap();
        assert_eq!(read_back, data);
    }

    #[tokio::test]
    async fn test_object_store_remove_best_effort() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::new(Arc::new(LocalBackend::new(dir.path())));
        // Removing something that never existed must not panic or error.
        store.remove("ghost/path.bin").await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_written_files_are_not_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let backend = backend(&dir);
        backend.write("perm.bin", b"x", "text/plain").await.unwrap();

        let meta = std::fs::metadata(dir.path().join("perm.bin")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o644);
    }
}
