//! S3-compatible object storage backend built on Apache OpenDAL.
//!
//! Works against AWS S3 and S3-compatible services (MinIO, Cloudflare R2)
//! via a custom endpoint. Presigned URLs come from the service itself, so
//! download traffic bypasses the pipeline.

use std::time::Duration;

use async_trait::async_trait;
use opendal::{services, Operator};
use tracing::debug;

use ledgerbox_core::{Error, Result, StorageKind};

use crate::{S3Config, StorageBackend};

/// Metadata key the content digest is stored under on each object.
const META_CONTENT_SHA256: &str = "content-sha256";

/// Object storage backend for one configured bucket.
#[derive(Debug)]
pub struct S3Backend {
    op: Operator,
    bucket: String,
}

impl S3Backend {
    /// Build an operator for the configured bucket.
    ///
    /// Credentials may be omitted, in which case OpenDAL falls back to the
    /// standard AWS environment/instance credential chain.
    pub fn new(config: &S3Config) -> Result<Self> {
        let mut builder = services::S3::default()
            .bucket(&config.bucket)
            .region(&config.region);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint(endpoint);
        }
        if let Some(access_key_id) = &config.access_key_id {
            builder = builder.access_key_id(access_key_id);
        }
        if let Some(secret_access_key) = &config.secret_access_key {
            builder = builder.secret_access_key(secret_access_key);
        }

        let op = Operator::new(builder)
            .map_err(|e| Error::Config(format!("s3 backend: {}", e)))?
            .finish();

        Ok(Self {
            op,
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn kind(&self) -> StorageKind {
        StorageKind::S3
    }

    fn bucket(&self) -> Option<&str> {
        Some(&self.bucket)
    }

    async fn write(&self, path: &str, data: &[u8], content_type: &str) -> Result<()> {
        debug!(storage_path = %path, size_bytes = data.len(), "s3 backend: put");
        let hash = crate::compute_content_hash(data);
        self.op
            .write_with(path, data.to_vec())
            .content_type(content_type)
            .user_metadata([(META_CONTENT_SHA256.to_string(), hash)])
            .await
            .map_err(|e| Error::Storage(format!("s3 put {}: {}", path, e)))?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let buffer = self
            .op
            .read(path)
            .await
            .map_err(|e| Error::Storage(format!("s3 get {}: {}", path, e)))?;
        Ok(buffer.to_vec())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.op
            .delete(path)
            .await
            .map_err(|e| Error::Storage(format!("s3 delete {}: {}", path, e)))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.op
            .exists(path)
            .await
            .map_err(|e| Error::Storage(format!("s3 head {}: {}", path, e)))
    }

    async fn signed_url(&self, path: &str, expires_in: Duration) -> Result<String> {
        let presigned = self
            .op
            .presign_read(path, expires_in)
            .await
            .map_err(|e| Error::Storage(format!("s3 presign {}: {}", path, e)))?;
        Ok(presigned.uri().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_bucket_is_config_error() {
        let config = S3Config {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
        };
        let err = S3Backend::new(&config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_backend_reports_bucket_and_kind() {
        let config = S3Config {
            bucket: "ledgerbox-test".to_string(),
            region: "eu-central-1".to_string(),
            endpoint: Some("http://127.0.0.1:9000".to_string()),
            access_key_id: Some("minio".to_string()),
            secret_access_key: Some("minio123".to_string()),
        };
        let backend = S3Backend::new(&config).unwrap();
        assert_eq!(backend.kind(), StorageKind::S3);
        assert_eq!(backend.bucket(), Some("ledgerbox-test"));
    }
}
