//! Environment-driven storage backend selection.
//!
//! The backend is chosen once at startup; the rest of the system only sees
//! the [`StorageBackend`](crate::StorageBackend) trait.

use std::str::FromStr;
use std::sync::Arc;

use ledgerbox_core::{defaults, Error, Result, StorageKind};

use crate::{LocalBackend, S3Backend, StorageBackend};

/// Credentials and addressing for an S3-compatible service.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, R2).
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Storage configuration resolved from the environment.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `STORAGE_BACKEND` | `local` | Backend selector: `local` or `s3` |
/// | `STORAGE_LOCAL_ROOT` | `/var/ledgerbox/attachments` | Local root dir |
/// | `S3_BUCKET` | — | Bucket name (required for `s3`) |
/// | `S3_REGION` | `us-east-1` | Bucket region |
/// | `S3_ENDPOINT` | — | Custom endpoint (optional) |
/// | `S3_ACCESS_KEY_ID` | — | Static credentials (optional) |
/// | `S3_SECRET_ACCESS_KEY` | — | Static credentials (optional) |
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageKind,
    pub local_root: String,
    pub s3: Option<S3Config>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageKind::Local,
            local_root: defaults::STORAGE_LOCAL_ROOT.to_string(),
            s3: None,
        }
    }
}

impl StorageConfig {
    /// Read configuration from environment variables with defaults.
    pub fn from_env() -> Result<Self> {
        let backend = match std::env::var("STORAGE_BACKEND") {
            Ok(v) => StorageKind::from_str(&v).map_err(Error::Config)?,
            Err(_) => StorageKind::Local,
        };

        let local_root = std::env::var("STORAGE_LOCAL_ROOT")
            .unwrap_or_else(|_| defaults::STORAGE_LOCAL_ROOT.to_string());

        let s3 = match backend {
            StorageKind::Local => None,
            StorageKind::S3 => {
                let bucket = std::env::var("S3_BUCKET").map_err(|_| {
                    Error::Config("S3_BUCKET is required when STORAGE_BACKEND=s3".to_string())
                })?;
                Some(S3Config {
                    bucket,
                    region: std::env::var("S3_REGION")
                        .unwrap_or_else(|_| "us-east-1".to_string()),
                    endpoint: std::env::var("S3_ENDPOINT").ok(),
                    access_key_id: std::env::var("S3_ACCESS_KEY_ID").ok(),
                    secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY").ok(),
                })
            }
        };

        Ok(Self {
            backend,
            local_root,
            s3,
        })
    }

    /// Build the configured backend (strategy selection happens here, once).
    pub fn build(&self) -> Result<Arc<dyn StorageBackend>> {
        match self.backend {
            StorageKind::Local => Ok(Arc::new(LocalBackend::new(&self.local_root))),
            StorageKind::S3 => {
                let s3 = self.s3.as_ref().ok_or_else(|| {
                    Error::Config("s3 backend selected without S3 configuration".to_string())
                })?;
                Ok(Arc::new(S3Backend::new(s3)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_local() {
        let config = StorageConfig::default();
        assert_eq!(config.backend, StorageKind::Local);
        assert_eq!(config.local_root, defaults::STORAGE_LOCAL_ROOT);
        assert!(config.s3.is_none());
    }

    #[test]
    fn test_build_local_backend() {
        let config = StorageConfig {
            backend: StorageKind::Local,
            local_root: "/tmp/ledgerbox-test".to_string(),
            s3: None,
        };
        let backend = config.build().unwrap();
        assert_eq!(backend.kind(), StorageKind::Local);
    }

    #[test]
    fn test_build_s3_without_config_fails() {
        let config = StorageConfig {
            backend: StorageKind::S3,
            local_root: String::new(),
            s3: None,
        };
        assert!(matches!(config.build(), Err(Error::Config(_))));
    }

    #[test]
    fn test_build_s3_backend() {
        let config = StorageConfig {
            backend: StorageKind::S3,
            local_root: String::new(),
            s3: Some(S3Config {
                bucket: "attachments".to_string(),
                region: "us-east-1".to_string(),
                endpoint: Some("http://127.0.0.1:9000".to_string()),
                access_key_id: Some("key".to_string()),
                secret_access_key: Some("secret".to_string()),
            }),
        };
        let backend = config.build().unwrap();
        assert_eq!(backend.kind(), StorageKind::S3);
        assert_eq!(backend.bucket(), Some("attachments"));
    }
}
