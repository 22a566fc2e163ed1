use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::core::ArcaError;

/// Produces a DER-encoded CMS (PKCS#7) envelope with the TRA embedded.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, tra_xml: &str) -> Result<Vec<u8>, ArcaError>;
}

/// Signs by shelling out to `openssl smime`.
#[derive(Debug, Clone)]
pub struct OpensslSigner {
    openssl_bin: PathBuf,
    cert_path: PathBuf,
    key_path: PathBuf,
    timeout: Duration,
}

impl OpensslSigner {
    /// Use `openssl` from `PATH`.
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            openssl_bin: PathBuf::from("openssl"),
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_binary(mut self, openssl_bin: impl Into<PathBuf>) -> Self {
        self.openssl_bin = openssl_bin.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.openssl_bin
    }

    /// Run `openssl version` and return its output.
    pub async fn probe(&self) -> Result<String, ArcaError> {
        let output = tokio::time::timeout(
            Duration::from_secs(5),
            Command::new(&self.openssl_bin)
                .arg("version")
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ArcaError::Signing("openssl version timed out".into()))?
        .map_err(|e| {
            ArcaError::Signing(format!(
                "cannot run {}: {e}",
                self.openssl_bin.display()
            ))
        })?;

        if !output.status.success() {
            return Err(ArcaError::Signing(format!(
                "{} version exited with {}",
                self.openssl_bin.display(),
                output.status
            )));
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(binary = %self.openssl_bin.display(), %version, "openssl available");
        Ok(version)
    }

    async fn ensure_exists(path: &Path, what: &str) -> Result<(), ArcaError> {
        match tokio::fs::try_exists(path).await {
            Ok(true) => Ok(()),
            _ => Err(ArcaError::CertificateNotFound(format!(
                "{what} {}",
                path.display()
            ))),
        }
    }
}

#[async_trait]
impl Signer for OpensslSigner {
    async fn sign(&self, tra_xml: &str) -> Result<Vec<u8>, ArcaError> {
        Self::ensure_exists(&self.cert_path, "certificate").await?;
        Self::ensure_exists(&self.key_path, "private key").await?;

        let scratch = tempfile::tempdir()
            .map_err(|e| ArcaError::Signing(format!("cannot create scratch dir: {e}")))?;
        let tra_path = scratch.path().join("tra.xml");
        let cms_path = scratch.path().join("tra.cms");

        tokio::fs::write(&tra_path, tra_xml)
            .await
            .map_err(|e| ArcaError::Signing(format!("cannot write TRA: {e}")))?;

        debug!(binary = %self.openssl_bin.display(), "signing TRA");

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.openssl_bin)
                .arg("smime")
                .arg("-sign")
                .arg("-in")
                .arg(&tra_path)
                .arg("-out")
                .arg(&cms_path)
                .arg("-signer")
                .arg(&self.cert_path)
                .arg("-inkey")
                .arg(&self.key_path)
                .args(["-outform", "DER", "-nodetach"])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ArcaError::Signing("openssl smime timed out".into()))?
        .map_err(|e| {
            ArcaError::Signing(format!(
                "cannot run {}: {e}",
                self.openssl_bin.display()
            ))
        })?;

        if !output.status.success() {
            return Err(ArcaError::Signing(format!(
                "openssl smime exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let cms = tokio::fs::read(&cms_path)
            .await
            .map_err(|e| ArcaError::Signing(format!("cannot read CMS output: {e}")))?;
        if cms.is_empty() {
            return Err(ArcaError::Signing("openssl produced an empty CMS".into()));
        }

        Ok(cms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_certificate_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let signer = OpensslSigner::new(dir.path().join("cert.crt"), dir.path().join("key.key"));
        let err = signer.sign("<tra/>").await.unwrap_err();
        assert!(matches!(err, ArcaError::CertificateNotFound(_)));
        assert!(err.to_string().contains("cert.crt"));
    }

    #[tokio::test]
    async fn missing_key_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.crt");
        std::fs::write(&cert, "dummy").unwrap();
        let signer = OpensslSigner::new(&cert, dir.path().join("key.key"));
        let err = signer.sign("<tra/>").await.unwrap_err();
        assert!(err.to_string().contains("private key"));
    }

    #[tokio::test]
    async fn unknown_binary_fails_probe() {
        let signer = OpensslSigner::new("c", "k").with_binary("/nonexistent/openssl-bin");
        let err = signer.probe().await.unwrap_err();
        assert!(matches!(err, ArcaError::Signing(_)));
    }
}
