//! # uid-bridge
//!
//! Batch dispatch engine that delivers address/identity bindings and tag
//! updates to a legacy User-ID Agent over mutual TLS.
//!
//! ## Design Philosophy
//!
//! uid-bridge is designed to be:
//! - **One job at a time** - A single engine slot; concurrent start requests are rejected, never queued
//! - **Stoppable** - Cooperative stop between batches, plus a forced emergency reset
//! - **Explicit about TLS** - The relaxed policy needed by legacy Agents is configured, labelled and isolated in one transport
//! - **Event-driven** - Consumers subscribe to job and verification events
//!
//! ## Quick Start
//!
//! ```no_run
//! use uid_bridge::{BindAction, Config, Dispatcher, RangeJobSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.agent.endpoint = "10.1.1.1:5006".to_string();
//!
//!     let dispatcher = Dispatcher::with_legacy_tls(config)?;
//!
//!     // Subscribe to events
//!     let mut events = dispatcher.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let job_id = dispatcher
//!         .start_range_job(RangeJobSpec {
//!             subnet: "10.0.0.0/24".into(),
//!             user_prefix: "corp\\host".into(),
//!             timeout: 3600,
//!             batch_size: None,
//!             endpoint: None,
//!             cert_bundle: None,
//!             operation: BindAction::Login,
//!         })
//!         .await?;
//!     println!("job {job_id} started");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Batch dispatcher (decomposed into focused submodules)
pub mod dispatcher;
/// Error types
pub mod error;
/// In-memory log ring buffer and tracing setup
pub mod log_buffer;
/// Two-stage endpoint verification
pub mod probe;
/// uid-message document encoding and decoding
pub mod protocol;
/// Lazy entry sources for range- and count-driven jobs
pub mod source;
/// Legacy mTLS transport and certificate lookup
pub mod transport;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, DispatchConfig, MinTlsVersion, TlsPolicy};
pub use dispatcher::{Dispatcher, VerifyOutcome};
pub use error::{ApiError, Error, ErrorDetail, Result, ToHttpStatus, TransportError};
pub use source::Network;
pub use transport::{CertificateProvider, ConnectionTarget, Transport};
pub use types::{
    AgentResponse, AgentStatus, BindAction, CountJobSpec, Entry, Event, JobId, JobOutcome,
    JobReport, Progress, ProbeStage, RangeJobSpec, SingleMappingRequest, TagAction, TagEntry,
    TagRequest, UidMessage, VerifyRequest,
};

/// Helper function to run the dispatcher with graceful signal handling.
///
/// Waits for a termination signal and then calls the dispatcher's `shutdown()`
/// method, which stops any running job.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use uid_bridge::{Dispatcher, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let dispatcher = Dispatcher::with_legacy_tls(Config::default())?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(&dispatcher).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(dispatcher: &Dispatcher) -> Result<()> {
    wait_for_signal().await;
    dispatcher.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("SIGTERM received, shutting down"),
                _ = sigint.recv() => tracing::info!("SIGINT received, shutting down"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "could not register both signal handlers, waiting on the other");
            only.recv().await;
            tracing::info!("termination signal received, shutting down");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "could not register signal handlers, falling back to ctrl_c");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Ctrl+C received, shutting down"),
        Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
    }
}
