//! Connectivity prober
//!
//! Verifies an Agent endpoint in two stages so operators can tell a closed
//! port apart from a credential or protocol problem:
//!
//! 1. `TCP`: open and close a plain TCP connection
//! 2. `mTLS/API`: deliver the version probe document through the [`Transport`]
//!
//! An endpoint string that cannot be parsed fails at the `Format` stage.

use crate::error::{Error, Result};
use crate::protocol;
use crate::transport::{ConnectionTarget, Transport};
use crate::types::{AgentResponse, ProbeStage, UidMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

/// Two-stage endpoint verifier
#[derive(Clone)]
pub struct Prober {
    transport: Arc<dyn Transport>,
    connect_timeout: Duration,
}

impl Prober {
    /// Create a prober sharing the dispatcher's transport
    pub fn new(transport: Arc<dyn Transport>, connect_timeout: Duration) -> Self {
        Self {
            transport,
            connect_timeout,
        }
    }

    /// Run both stages against `target`
    ///
    /// Returns the Agent's answer to the version probe, or
    /// [`Error::Verification`] tagged with the failing stage.
    pub async fn probe(&self, target: &ConnectionTarget) -> Result<AgentResponse> {
        let endpoint = target.parse_endpoint().map_err(|e| Error::Verification {
            stage: ProbeStage::Format,
            message: e.to_string(),
        })?;

        tracing::info!(endpoint = %endpoint, "probe stage 1: testing TCP connectivity");
        let address = (endpoint.host.as_str(), endpoint.port);
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => drop(stream),
            Ok(Err(e)) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "probe stage 1 failed");
                return Err(Error::Verification {
                    stage: ProbeStage::Tcp,
                    message: format!(
                        "port {} is not reachable ({e}); check firewall and Agent service",
                        endpoint.port
                    ),
                });
            }
            Err(_) => {
                tracing::warn!(endpoint = %endpoint, "probe stage 1 timed out");
                return Err(Error::Verification {
                    stage: ProbeStage::Tcp,
                    message: format!(
                        "port {} did not answer within {}s; check firewall and Agent service",
                        endpoint.port,
                        self.connect_timeout.as_secs()
                    ),
                });
            }
        }
        tracing::info!(endpoint = %endpoint, "probe stage 1 succeeded: port is open");

        tracing::info!(endpoint = %endpoint, "probe stage 2: testing mTLS and API response");
        let document = protocol::encode(&UidMessage::VersionProbe);
        let response = self
            .transport
            .send(&document, target)
            .await
            .map_err(|e| Error::Verification {
                stage: ProbeStage::MtlsApi,
                message: e.to_string(),
            })?;
        tracing::info!(endpoint = %endpoint, "probe stage 2 succeeded: Agent responded");

        Ok(response)
    }
}
