//! Provider fetch collaborator contract.
//!
//! Token lifecycle and provider-specific API clients live outside the
//! pipeline; the orchestrator only needs "fetch raw bytes for attachment X
//! of email Y".

use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use ledgerbox_core::{Error, Provider, Result};

/// Everything a provider client needs to locate one attachment.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub provider: Provider,
    pub connection_id: Uuid,
    pub external_id: String,
    pub email_id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
}

/// Capability to fetch raw attachment bytes from an email provider.
///
/// Implementations own auth and token refresh entirely.
#[async_trait]
pub trait ProviderFetch: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>>;
}

/// Development/test implementation reading attachment bytes from a local
/// spool directory laid out as `{root}/{provider}/{external_id}`.
///
/// Production deployments inject real provider clients instead.
pub struct SpoolDirProvider {
    root: PathBuf,
}

impl SpoolDirProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ProviderFetch for SpoolDirProvider {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<u8>> {
        let path = self
            .root
            .join(request.provider.to_string())
            .join(&request.external_id);
        tokio::fs::read(&path).await.map_err(|e| {
            Error::Provider(format!(
                "spool fetch {} for email {}: {}",
                path.display(),
                request.email_id,
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(external_id: &str) -> FetchRequest {
        FetchRequest {
            provider: Provider::Gmail,
            connection_id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            email_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_spool_fetch_reads_bytes() {
        let dir = TempDir::new().unwrap();
        let gmail_dir = dir.path().join("gmail");
        std::fs::create_dir_all(&gmail_dir).unwrap();
        std::fs::write(gmail_dir.join("att-1"), b"%PDF-1.4").unwrap();

        let provider = SpoolDirProvider::new(dir.path());
        let data = provider.fetch(&request("att-1")).await.unwrap();
        assert_eq!(data, b"%PDF-1.4");
    }

    #[tokio::test]
    async fn test_spool_fetch_missing_is_provider_error() {
        let dir = TempDir::new().unwrap();
        let provider = SpoolDirProvider::new(dir.path());
        let err = provider.fetch(&request("ghost")).await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert!(err.is_transient());
    }
}
