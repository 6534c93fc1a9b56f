//! Client credential lookup
//!
//! A certificate bundle is a logical name for three PEM files: the client
//! certificate, its private key and the trust anchor used to validate the
//! Agent. [`DirCertificateProvider`] maps the name `default` to the configured
//! certificate directory and any other name to a subdirectory of it.

use crate::config::CertConfig;
use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use utoipa::ToSchema;

/// Name of the bundle stored directly in the certificate directory
pub const DEFAULT_BUNDLE: &str = "default";

/// PEM material for one mTLS session
#[derive(Clone)]
pub struct CertificateBundle {
    /// Client certificate (PEM)
    pub client_cert: Vec<u8>,
    /// Client private key (PEM: PKCS#8, PKCS#1 or SEC1)
    pub client_key: Vec<u8>,
    /// Trust anchor for the Agent's certificate (PEM)
    pub trust_anchor: Vec<u8>,
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("client_cert", &self.client_cert.len())
            .field("client_key", &"<redacted>")
            .field("trust_anchor", &self.trust_anchor.len())
            .finish()
    }
}

/// Presence of each credential file in a bundle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CertStatus {
    /// Bundle name
    pub bundle: String,
    /// Directory the bundle resolves to
    pub directory: String,
    /// Client certificate present
    pub client_cert: bool,
    /// Client private key present
    pub client_key: bool,
    /// Trust anchor present
    pub trust_anchor: bool,
    /// All three files present
    pub ready: bool,
}

/// Locates client credentials by logical bundle name
#[async_trait]
pub trait CertificateProvider: Send + Sync {
    /// Load the bundle's PEM material
    ///
    /// Fails with [`TransportError::MissingCredentials`] naming every absent
    /// file. No network activity happens here.
    async fn resolve(&self, bundle: &str) -> Result<CertificateBundle, TransportError>;

    /// Report which of the bundle's files are present
    async fn status(&self, bundle: &str) -> CertStatus;
}

/// Certificate provider backed by a directory tree
#[derive(Clone, Debug)]
pub struct DirCertificateProvider {
    config: CertConfig,
}

impl DirCertificateProvider {
    /// Create a provider rooted at `config.cert_dir`
    pub fn new(config: CertConfig) -> Self {
        Self { config }
    }

    /// Directory holding the named bundle
    pub fn bundle_dir(&self, bundle: &str) -> PathBuf {
        if bundle.is_empty() || bundle == DEFAULT_BUNDLE {
            self.config.cert_dir.clone()
        } else {
            self.config.cert_dir.join(bundle)
        }
    }

    fn paths(&self, bundle: &str) -> [PathBuf; 3] {
        let dir = self.bundle_dir(bundle);
        [
            dir.join(&self.config.client_cert),
            dir.join(&self.config.client_key),
            dir.join(&self.config.trust_anchor),
        ]
    }
}

fn is_valid_bundle_name(bundle: &str) -> bool {
    bundle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !bundle.starts_with('.')
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[async_trait]
impl CertificateProvider for DirCertificateProvider {
    async fn resolve(&self, bundle: &str) -> Result<CertificateBundle, TransportError> {
        if !is_valid_bundle_name(bundle) {
            return Err(TransportError::MissingCredentials {
                missing: vec![self.config.cert_dir.join(bundle)],
            });
        }

        let [cert, key, anchor] = self.paths(bundle);
        let mut missing = Vec::new();
        for path in [&cert, &key, &anchor] {
            if !exists(path).await {
                missing.push(path.clone());
            }
        }
        if !missing.is_empty() {
            return Err(TransportError::MissingCredentials { missing });
        }

        Ok(CertificateBundle {
            client_cert: read_pem(&cert).await?,
            client_key: read_pem(&key).await?,
            trust_anchor: read_pem(&anchor).await?,
        })
    }

    async fn status(&self, bundle: &str) -> CertStatus {
        let [cert, key, anchor] = self.paths(bundle);
        let valid = is_valid_bundle_name(bundle);
        let client_cert = valid && exists(&cert).await;
        let client_key = valid && exists(&key).await;
        let trust_anchor = valid && exists(&anchor).await;

        CertStatus {
            bundle: bundle.to_string(),
            directory: self.bundle_dir(bundle).display().to_string(),
            client_cert,
            client_key,
            trust_anchor,
            ready: client_cert && client_key && trust_anchor,
        }
    }
}

async fn read_pem(path: &Path) -> Result<Vec<u8>, TransportError> {
    tokio::fs::read(path).await.map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "failed to read credential file");
        TransportError::MissingCredentials {
            missing: vec![path.to_path_buf()],
        }
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn provider(dir: &TempDir) -> DirCertificateProvider {
        DirCertificateProvider::new(CertConfig {
            cert_dir: dir.path().to_path_buf(),
            ..CertConfig::default()
        })
    }

    fn write_bundle(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("uia-client.crt"), b"cert").unwrap();
        std::fs::write(dir.join("uia-client.key"), b"key").unwrap();
        std::fs::write(dir.join("rootCA.crt"), b"anchor").unwrap();
    }

    #[tokio::test]
    async fn missing_files_are_all_named() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("uia-client.crt"), b"cert").unwrap();

        let err = provider(&dir).resolve(DEFAULT_BUNDLE).await.unwrap_err();
        match err {
            TransportError::MissingCredentials { missing } => {
                assert_eq!(missing.len(), 2);
                assert!(missing.iter().any(|p| p.ends_with("uia-client.key")));
                assert!(missing.iter().any(|p| p.ends_with("rootCA.crt")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn default_bundle_reads_root_directory() {
        let dir = TempDir::new().unwrap();
        write_bundle(dir.path());

        let bundle = provider(&dir).resolve(DEFAULT_BUNDLE).await.unwrap();
        assert_eq!(bundle.client_cert, b"cert");
        assert_eq!(bundle.client_key, b"key");
        assert_eq!(bundle.trust_anchor, b"anchor");
    }

    #[tokio::test]
    async fn named_bundle_reads_subdirectory() {
        let dir = TempDir::new().unwrap();
        write_bundle(&dir.path().join("branch-office"));

        let provider = provider(&dir);
        assert!(provider.resolve("branch-office").await.is_ok());
        assert!(provider.resolve(DEFAULT_BUNDLE).await.is_err());
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_bundle(dir.path());

        let provider = provider(&dir);
        assert!(provider.resolve("../etc").await.is_err());
        assert!(!provider.status("../etc").await.ready);
    }

    #[tokio::test]
    async fn status_reports_each_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("rootCA.crt"), b"anchor").unwrap();

        let status = provider(&dir).status(DEFAULT_BUNDLE).await;
        assert!(!status.client_cert);
        assert!(!status.client_key);
        assert!(status.trust_anchor);
        assert!(!status.ready);

        write_bundle(dir.path());
        assert!(provider(&dir).status(DEFAULT_BUNDLE).await.ready);
    }
}
