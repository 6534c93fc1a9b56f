//! Batch dispatcher split into focused submodules.
//!
//! The `Dispatcher` struct and its methods are organized by domain:
//! - [`control`] - Job registry: start, stop, emergency stop, progress
//! - [`engine`] - The job worker and the shared engine state it advances
//! - [`direct`] - Single mapping and tag pass-throughs (no job involved)
//! - [`agent`] - Endpoint verification and status

mod agent;
mod control;
mod direct;
mod engine;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use agent::VerifyOutcome;

use crate::config::Config;
use crate::error::Result;
use crate::probe::Prober;
use crate::transport::{CertificateProvider, DirCertificateProvider, LegacyTlsTransport, Transport};
use crate::types::Event;
use engine::EngineCore;
use std::sync::Arc;

/// Stored Agent endpoint and whether it has been verified
#[derive(Clone, Debug)]
pub(crate) struct AgentTarget {
    pub(crate) endpoint: String,
    pub(crate) verified: bool,
}

/// Main dispatcher instance (cloneable - all fields are Arc-wrapped)
///
/// Owns the single job slot, the stored Agent endpoint and the event channel.
/// Every clone drives the same engine.
#[derive(Clone)]
pub struct Dispatcher {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Delivers encoded documents
    pub(crate) transport: Arc<dyn Transport>,
    /// Locates client credentials
    pub(crate) certs: Arc<dyn CertificateProvider>,
    /// Two-stage endpoint verifier sharing `transport`
    pub(crate) prober: Prober,
    /// Job slot, counters and last report
    pub(crate) engine: Arc<EngineCore>,
    /// Stored Agent endpoint (std lock: never held across an await)
    pub(crate) agent: Arc<std::sync::RwLock<AgentTarget>>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl Dispatcher {
    /// Create a dispatcher over explicit transport and certificate capabilities
    ///
    /// The configuration is validated first; the stored Agent endpoint starts
    /// as `config.agent.endpoint`, unverified.
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        certs: Arc<dyn CertificateProvider>,
    ) -> Result<Self> {
        config.validate()?;

        // Buffer of 1000 events per subscriber before lagging
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let prober = Prober::new(transport.clone(), config.agent.connect_timeout);
        let agent = AgentTarget {
            endpoint: config.agent.endpoint.clone(),
            verified: false,
        };

        Ok(Self {
            config: Arc::new(config),
            transport,
            certs,
            prober,
            engine: Arc::new(EngineCore::new()),
            agent: Arc::new(std::sync::RwLock::new(agent)),
            event_tx,
        })
    }

    /// Create a dispatcher using certificate files from `config.certs` and the legacy TLS transport
    pub fn with_legacy_tls(config: Config) -> Result<Self> {
        let certs: Arc<dyn CertificateProvider> =
            Arc::new(DirCertificateProvider::new(config.certs.clone()));
        let transport: Arc<dyn Transport> =
            Arc::new(LegacyTlsTransport::new(certs.clone(), &config.agent));

        tracing::info!(
            cert_dir = %config.certs.cert_dir.display(),
            min_tls = ?config.agent.tls.min_version,
            verify_hostname = config.agent.tls.verify_hostname,
            "legacy TLS transport initialized"
        );

        Self::new(config, transport, certs)
    }

    /// Subscribe to dispatcher events
    ///
    /// Each subscriber receives all events independently. A subscriber that
    /// falls more than 1000 events behind receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Emit an event to all subscribers
    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// Spawn the REST API server in a background task
    pub fn spawn_api_server(
        self: &Arc<Self>,
        logs: crate::log_buffer::LogBuffer,
    ) -> tokio::task::JoinHandle<Result<()>> {
        let dispatcher = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(dispatcher, config, logs).await })
    }
}
