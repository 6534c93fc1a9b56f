//! Shared test helpers: in-memory transports and dispatcher construction.

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::TransportError;
use crate::protocol;
use crate::transport::{CertStatus, CertificateBundle, CertificateProvider, ConnectionTarget, Transport};
use crate::types::{AgentResponse, UidMessage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

pub(crate) fn ok_response() -> AgentResponse {
    AgentResponse {
        status: 200,
        reason: "OK".into(),
        body: "<response status=\"success\"/>".into(),
    }
}

/// Config with pauses shortened for tests
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.dispatch.batch_pause = Duration::from_millis(1);
    config.dispatch.rate_limit_pause = Duration::from_millis(5);
    config.dispatch.emergency_grace = Duration::from_millis(200);
    config.agent.connect_timeout = Duration::from_secs(1);
    config
}

/// Helper to create a dispatcher over a test transport with the default test config
pub(crate) fn create_test_dispatcher(transport: Arc<dyn Transport>) -> Dispatcher {
    create_dispatcher_with_config(transport, test_config())
}

pub(crate) fn create_dispatcher_with_config(
    transport: Arc<dyn Transport>,
    config: Config,
) -> Dispatcher {
    Dispatcher::new(config, transport, Arc::new(StaticCertificateProvider)).unwrap()
}

/// Wait until the engine reports `running == false`
pub(crate) async fn wait_for_idle(dispatcher: &Dispatcher) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while dispatcher.get_progress().running {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job did not finish in time");
}

/// Certificate provider that always has a complete bundle
pub(crate) struct StaticCertificateProvider;

#[async_trait]
impl CertificateProvider for StaticCertificateProvider {
    async fn resolve(&self, _bundle: &str) -> Result<CertificateBundle, TransportError> {
        Ok(CertificateBundle {
            client_cert: b"cert".to_vec(),
            client_key: b"key".to_vec(),
            trust_anchor: b"anchor".to_vec(),
        })
    }

    async fn status(&self, bundle: &str) -> CertStatus {
        CertStatus {
            bundle: bundle.to_string(),
            directory: "memory".into(),
            client_cert: true,
            client_key: true,
            trust_anchor: true,
            ready: true,
        }
    }
}

/// Records every delivery; selected calls fail
#[derive(Default)]
pub(crate) struct RecordingTransport {
    calls: Mutex<Vec<(String, ConnectionTarget)>>,
    failures: Mutex<HashMap<usize, TransportError>>,
    fail_all: Option<TransportError>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the zero-based `call` with `error`
    pub(crate) fn failing_on(call: usize, error: TransportError) -> Arc<Self> {
        let transport = Self::default();
        transport.failures.lock().unwrap().insert(call, error);
        Arc::new(transport)
    }

    /// Fail every call with `error`
    pub(crate) fn failing_always(error: TransportError) -> Arc<Self> {
        Arc::new(Self {
            fail_all: Some(error),
            ..Self::default()
        })
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Every delivered document, decoded
    pub(crate) fn messages(&self) -> Vec<UidMessage> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(doc, _)| protocol::decode(doc).unwrap())
            .collect()
    }

    pub(crate) fn targets(&self) -> Vec<ConnectionTarget> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, target)| target.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        document: &str,
        target: &ConnectionTarget,
    ) -> Result<AgentResponse, TransportError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((document.to_string(), target.clone()));
            calls.len() - 1
        };
        if let Some(error) = &self.fail_all {
            return Err(error.clone());
        }
        match self.failures.lock().unwrap().get(&index) {
            Some(error) => Err(error.clone()),
            None => Ok(ok_response()),
        }
    }
}

/// Holds every delivery until the test releases it
pub(crate) struct GatedTransport {
    pub(crate) in_flight: Notify,
    pub(crate) release: Semaphore,
    calls: AtomicUsize,
}

impl GatedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            in_flight: Notify::new(),
            release: Semaphore::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Let `n` held (or future) deliveries complete
    pub(crate) fn release(&self, n: usize) {
        self.release.add_permits(n);
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(
        &self,
        _document: &str,
        _target: &ConnectionTarget,
    ) -> Result<AgentResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.in_flight.notify_one();
        self.release.acquire().await.unwrap().forget();
        Ok(ok_response())
    }
}

/// Never answers, like an Agent that accepted the connection and hung
#[derive(Default)]
pub(crate) struct HangingTransport {
    pub(crate) in_flight: Notify,
}

#[async_trait]
impl Transport for HangingTransport {
    async fn send(
        &self,
        _document: &str,
        _target: &ConnectionTarget,
    ) -> Result<AgentResponse, TransportError> {
        self.in_flight.notify_one();
        std::future::pending().await
    }
}
