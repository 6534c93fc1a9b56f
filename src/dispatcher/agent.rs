//! Endpoint verification and status.

use crate::error::{Error, Result};
use crate::transport::{CertStatus, ConnectionTarget};
use crate::types::{AgentStatus, Event, VerifyRequest};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Dispatcher;

/// Result of a successful verification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VerifyOutcome {
    /// Endpoint now stored
    pub endpoint: String,
    /// True when the probe was skipped
    pub forced: bool,
    /// Human-readable summary
    pub message: String,
}

impl Dispatcher {
    /// Verify an endpoint and store it as the Agent endpoint
    ///
    /// With `force` the endpoint is stored as verified without any network
    /// activity (its format is still checked). Otherwise the two-stage probe
    /// runs; on failure the verified flag is cleared and the failing stage is
    /// returned in [`Error::Verification`].
    pub async fn verify_endpoint(&self, request: VerifyRequest) -> Result<VerifyOutcome> {
        let endpoint = request.endpoint.trim().to_string();
        let cert_bundle = request
            .cert_bundle
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| self.config.agent.cert_bundle.clone());
        let target = ConnectionTarget::new(endpoint.clone(), cert_bundle);
        tracing::info!(endpoint = %endpoint, force = request.force, "connection test requested");

        if request.force {
            target.parse_endpoint()?;
            tracing::warn!(endpoint = %endpoint, "bypassing verification as requested");
            self.store_endpoint(&endpoint, true);
            self.emit_event(Event::EndpointVerified {
                endpoint: endpoint.clone(),
                forced: true,
            });
            return Ok(VerifyOutcome {
                endpoint,
                forced: true,
                message: "configuration saved (verification bypassed)".into(),
            });
        }

        match self.prober.probe(&target).await {
            Ok(_) => {
                self.store_endpoint(&endpoint, true);
                self.emit_event(Event::EndpointVerified {
                    endpoint: endpoint.clone(),
                    forced: false,
                });
                Ok(VerifyOutcome {
                    endpoint,
                    forced: false,
                    message: "verification successful".into(),
                })
            }
            Err(e) => {
                self.set_verified(false);
                if let Error::Verification { stage, message } = &e {
                    tracing::warn!(endpoint = %endpoint, stage = %stage, error = %message, "verification failed");
                    self.emit_event(Event::VerificationFailed {
                        endpoint,
                        stage: *stage,
                        error: message.clone(),
                    });
                }
                Err(e)
            }
        }
    }

    /// Service status for the control surface
    pub fn agent_status(&self) -> AgentStatus {
        let agent = self.agent.read().unwrap_or_else(|e| e.into_inner());
        AgentStatus {
            status: "online".into(),
            job_active: self.get_progress().running,
            config_verified: agent.verified,
            agent_endpoint: agent.endpoint.clone(),
        }
    }

    /// The stored Agent endpoint used when a request names none
    pub fn agent_endpoint(&self) -> String {
        self.agent
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .endpoint
            .clone()
    }

    /// Presence of the credential files for `bundle` (default: configured bundle)
    pub async fn cert_status(&self, bundle: Option<&str>) -> CertStatus {
        let bundle = bundle
            .filter(|b| !b.is_empty())
            .unwrap_or(self.config.agent.cert_bundle.as_str());
        self.certs.status(bundle).await
    }

    fn store_endpoint(&self, endpoint: &str, verified: bool) {
        let mut agent = self.agent.write().unwrap_or_else(|e| e.into_inner());
        agent.endpoint = endpoint.to_string();
        agent.verified = verified;
    }

    fn set_verified(&self, verified: bool) {
        self.agent
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .verified = verified;
    }
}
