//! Legacy mTLS transport to the Agent
//!
//! One call delivers one document: parse the endpoint, load credentials, open a
//! TLS session, POST the document to `/` and classify the outcome. Nothing is
//! kept between calls.
//!
//! # TLS policy
//!
//! [`LegacyTlsTransport`] is INTENTIONALLY WEAKENED for compatibility with
//! legacy Agents, as configured by [`TlsPolicy`]:
//! - protocol versions down to TLS 1.0 are offered
//! - the Agent's certificate is not matched against the endpoint host name
//!
//! The Agent must still present a certificate chaining to the configured trust
//! anchor; built-in public roots are never trusted.

mod certs;
mod endpoint;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub use certs::{CertStatus, CertificateBundle, CertificateProvider, DirCertificateProvider, DEFAULT_BUNDLE};
pub use endpoint::{ConnectionTarget, Endpoint};

use crate::config::{AgentConfig, MinTlsVersion, TlsPolicy};
use crate::error::TransportError;
use crate::protocol;
use crate::types::AgentResponse;
use async_trait::async_trait;
use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

/// Delivers one encoded document to an Agent
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `document` to `target` and return the Agent's answer
    ///
    /// Endpoint and credential problems are reported before any network
    /// attempt. An Agent-reported error inside a well-formed response is an
    /// [`TransportError::AgentError`], not a success.
    async fn send(
        &self,
        document: &str,
        target: &ConnectionTarget,
    ) -> Result<AgentResponse, TransportError>;
}

/// reqwest/native-tls transport with a relaxed, explicitly configured TLS policy
pub struct LegacyTlsTransport {
    certs: Arc<dyn CertificateProvider>,
    policy: TlsPolicy,
    request_timeout: Duration,
}

impl LegacyTlsTransport {
    /// Create a transport using the given credentials and agent settings
    pub fn new(certs: Arc<dyn CertificateProvider>, agent: &AgentConfig) -> Self {
        Self {
            certs,
            policy: agent.tls.clone(),
            request_timeout: agent.request_timeout,
        }
    }

    fn build_client(
        &self,
        endpoint: &Endpoint,
        bundle: &CertificateBundle,
    ) -> Result<reqwest::Client, TransportError> {
        let key = pkcs8_pem(&bundle.client_key)
            .map_err(|e| tls_error(endpoint, format!("client key: {}", error_chain(&e))))?;
        let identity = reqwest::Identity::from_pkcs8_pem(&bundle.client_cert, &key)
            .map_err(|e| tls_error(endpoint, format!("client certificate/key: {}", error_chain(&e))))?;
        let anchor = reqwest::Certificate::from_pem(&bundle.trust_anchor)
            .map_err(|e| tls_error(endpoint, format!("trust anchor: {}", error_chain(&e))))?;

        reqwest::Client::builder()
            .use_native_tls()
            .tls_built_in_root_certs(false)
            .add_root_certificate(anchor)
            .identity(identity)
            .min_tls_version(tls_version(self.policy.min_version))
            .danger_accept_invalid_hostnames(!self.policy.verify_hostname)
            .timeout(self.request_timeout)
            .no_proxy()
            .build()
            .map_err(|e| tls_error(endpoint, error_chain(&e)))
    }
}

#[async_trait]
impl Transport for LegacyTlsTransport {
    async fn send(
        &self,
        document: &str,
        target: &ConnectionTarget,
    ) -> Result<AgentResponse, TransportError> {
        let endpoint = target.parse_endpoint()?;
        let bundle = self.certs.resolve(&target.cert_bundle).await?;
        let client = self.build_client(&endpoint, &bundle)?;

        tracing::debug!(endpoint = %endpoint, bytes = document.len(), "posting uid-message");

        let response = client
            .post(endpoint.url())
            .header(reqwest::header::CONTENT_TYPE, protocol::CONTENT_TYPE)
            .body(document.to_owned())
            .send()
            .await
            .map_err(|e| classify(&endpoint, &e, self.request_timeout))?;

        let status = response.status();
        let reason = status.canonical_reason().unwrap_or("").to_string();
        let body = response
            .text()
            .await
            .map_err(|e| classify(&endpoint, &e, self.request_timeout))?;

        interpret_response(status.as_u16(), &reason, body)
    }
}

/// Turn a raw Agent answer into success or a classified failure
///
/// An error status embedded in the body takes precedence over the HTTP status
/// code. Bodies that are not XML are not an error by themselves.
pub fn interpret_response(
    status: u16,
    reason: &str,
    body: String,
) -> Result<AgentResponse, TransportError> {
    if let Some(message) = protocol::agent_error(&body) {
        return Err(TransportError::AgentError { message });
    }
    if status >= 400 {
        return Err(TransportError::HttpError {
            code: status,
            reason: reason.to_string(),
        });
    }
    Ok(AgentResponse {
        status,
        reason: reason.to_string(),
        body,
    })
}

/// Re-encode a PEM private key as PKCS#8
///
/// Accepts traditional PKCS#1 (`RSA PRIVATE KEY`) and SEC1 (`EC PRIVATE KEY`)
/// keys as written by OpenSSL tooling, as well as PKCS#8. Encrypted keys are
/// rejected rather than prompting for a passphrase.
fn pkcs8_pem(key: &[u8]) -> Result<Vec<u8>, openssl::error::ErrorStack> {
    openssl::pkey::PKey::private_key_from_pem_passphrase(key, b"")?.private_key_to_pem_pkcs8()
}

fn tls_version(version: MinTlsVersion) -> reqwest::tls::Version {
    match version {
        MinTlsVersion::Tls10 => reqwest::tls::Version::TLS_1_0,
        MinTlsVersion::Tls11 => reqwest::tls::Version::TLS_1_1,
        MinTlsVersion::Tls12 => reqwest::tls::Version::TLS_1_2,
    }
}

fn tls_error(endpoint: &Endpoint, reason: String) -> TransportError {
    TransportError::TlsError {
        endpoint: endpoint.to_string(),
        reason,
    }
}

fn classify(endpoint: &Endpoint, error: &reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        return TransportError::ConnectionError {
            endpoint: endpoint.to_string(),
            reason: format!("timed out after {}s", timeout.as_secs()),
        };
    }

    let reason = error_chain(error);
    let connection_error = |reason: String| TransportError::ConnectionError {
        endpoint: endpoint.to_string(),
        reason,
    };

    let mut source = error.source();
    while let Some(cause) = source {
        if cause.is::<native_tls::Error>() {
            return tls_error(endpoint, reason);
        }
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            match io.get_ref() {
                None => return connection_error(reason),
                Some(inner) if inner.is::<native_tls::Error>() => {
                    return tls_error(endpoint, reason);
                }
                Some(_) => break,
            }
        }
        source = cause.source();
    }

    // No typed cause in the chain; fall back to the message text
    if mentions_tls(&reason) {
        tls_error(endpoint, reason)
    } else {
        connection_error(reason)
    }
}

fn mentions_tls(reason: &str) -> bool {
    let reason = reason.to_ascii_lowercase();
    ["tls", "ssl", "certificate", "handshake"]
        .iter()
        .any(|needle| reason.contains(needle))
}

/// Render an error and all of its sources as one line
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}
