//! Application state for the API server

use crate::log_buffer::LogBuffer;
use crate::{Config, Dispatcher};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request (cheap Arc clone) and provides
/// access to the dispatcher, the configuration and the log ring buffer.
#[derive(Clone)]
pub struct AppState {
    /// The dispatcher driving jobs and direct sends
    pub dispatcher: Arc<Dispatcher>,

    /// Configuration (read-only)
    pub config: Arc<Config>,

    /// Recent log lines served by `GET /logs`
    pub logs: LogBuffer,
}

impl AppState {
    /// Create a new AppState
    pub fn new(dispatcher: Arc<Dispatcher>, config: Arc<Config>, logs: LogBuffer) -> Self {
        Self {
            dispatcher,
            config,
            logs,
        }
    }
}
