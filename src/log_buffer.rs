//! In-memory log ring buffer
//!
//! Keeps the most recent formatted log lines (`HH:MM:SS [LEVEL] message`) for
//! display by a UI through `GET /logs`. Appends and snapshots take a short
//! mutex; nothing else in the service shares it.

use crate::config::LogConfig;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Bounded, shareable buffer of formatted log lines
#[derive(Clone, Debug)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` lines
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append a line, evicting the oldest when full
    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Buffered lines, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.iter().cloned().collect()
    }

    /// Maximum number of lines kept
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// `tracing-subscriber` layer feeding a [`LogBuffer`]
pub struct LogBufferLayer {
    buffer: LogBuffer,
}

impl LogBufferLayer {
    /// Create a layer writing into `buffer`
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

impl<S: Subscriber> Layer<S> for LogBufferLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let line = format!(
            "{} [{}] {}",
            chrono::Local::now().format("%H:%M:%S"),
            event.metadata().level(),
            visitor.finish()
        );
        self.buffer.push(line);
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Install the global subscriber: env filter, stderr formatter and a log buffer
///
/// `RUST_LOG` takes precedence over `config.filter`. If a global subscriber is
/// already installed the buffer is still returned but receives no lines.
pub fn init_tracing(config: &LogConfig) -> LogBuffer {
    let buffer = LogBuffer::new(config.buffer_capacity);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(LogBufferLayer::new(buffer.clone()))
        .try_init();

    if let Err(e) = installed {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
    buffer
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_lines_are_evicted() {
        let buffer = LogBuffer::new(3);
        for i in 0..5 {
            buffer.push(format!("line {i}"));
        }
        assert_eq!(buffer.snapshot(), ["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn zero_capacity_keeps_one_line() {
        let buffer = LogBuffer::new(0);
        buffer.push("a".into());
        buffer.push("b".into());
        assert_eq!(buffer.snapshot(), ["b"]);
    }

    #[test]
    fn layer_formats_level_message_and_fields() {
        let buffer = LogBuffer::new(10);
        let subscriber =
            tracing_subscriber::registry().with(LogBufferLayer::new(buffer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(job_id = 4, "stop requested");
            tracing::info!("plain message");
        });

        let lines = buffer.snapshot();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[WARN] stop requested job_id=4"), "{}", lines[0]);
        assert!(lines[1].ends_with("[INFO] plain message"), "{}", lines[1]);
        // HH:MM:SS prefix
        assert_eq!(lines[0].as_bytes()[2], b':');
        assert_eq!(lines[0].as_bytes()[5], b':');
    }
}
