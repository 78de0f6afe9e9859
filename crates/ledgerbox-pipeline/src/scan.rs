//! Virus scanning seam.
//!
//! The pipeline defines the scan step and this narrow interface; the engine
//! behind it is injected. Production scanners must be swappable without
//! touching the orchestrator, which already handles the quarantine branch.

use async_trait::async_trait;

use ledgerbox_core::{Result, ScanVerdict};

/// Outcome of scanning one attachment's bytes.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub verdict: ScanVerdict,
    /// Name of the engine that produced the verdict.
    pub provider: String,
}

/// Capability to scan attachment content before classification.
#[async_trait]
pub trait VirusScanner: Send + Sync {
    async fn scan(&self, data: &[u8]) -> Result<ScanOutcome>;
}

/// Placeholder scanner that trusts everything.
#[derive(Debug, Default)]
pub struct NoopScanner;

#[async_trait]
impl VirusScanner for NoopScanner {
    async fn scan(&self, _data: &[u8]) -> Result<ScanOutcome> {
        Ok(ScanOutcome {
            verdict: ScanVerdict::Clean,
            provider: "noop".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_scanner_always_clean() {
        let scanner = NoopScanner;
        for payload in [&b""[..], b"MZ\x90\x00", b"%PDF-1.4"] {
            let outcome = scanner.scan(payload).await.unwrap();
            assert_eq!(outcome.verdict, ScanVerdict::Clean);
            assert_eq!(outcome.provider, "noop");
        }
    }
}
